//! The narrow interface to the P2P overlay that protocol runs consume.

pub mod cbor_codec;
pub mod memory;

use crate::{
    err::ProtocolResult,
    offer::Offer,
    protocol::{DirectMessage, NodeAddress},
};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives every decrypted direct message arriving at a node.
///
/// The overlay may call this from any thread. Implementations should hand the message over to
/// their own event loop rather than process it in place.
pub trait DirectMessageListener: Send + Sync + 'static {
    fn on_direct_message(&self, message: DirectMessage, sender: NodeAddress);
}

pub trait P2pService: Send + Sync + 'static {
    /// Register a listener. Registering the same listener twice has no effect.
    fn add_direct_message_listener(&self, listener: Arc<dyn DirectMessageListener>);

    /// Unregister a listener by identity. Unregistering an unknown listener has no effect.
    fn remove_direct_message_listener(&self, listener: &Arc<dyn DirectMessageListener>);

    /// Send a message to a peer. Resolves once the overlay accepted it for delivery.
    fn send_direct_message(
        &self,
        peer: &NodeAddress,
        message: DirectMessage,
    ) -> BoxFuture<'static, ProtocolResult<()>>;

    fn resolve_peer_address(&self, offer: &Offer) -> Option<NodeAddress> {
        Some(offer.maker_node_address().clone())
    }
}

fn same_listener(a: &Arc<dyn DirectMessageListener>, b: &Arc<dyn DirectMessageListener>) -> bool {
    // compare data pointers only, vtable pointers are not guaranteed unique
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Identity based set of listeners, for `P2pService` implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn DirectMessageListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> ListenerRegistry {
        ListenerRegistry::default()
    }

    pub fn add(&self, listener: Arc<dyn DirectMessageListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn DirectMessageListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| !same_listener(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a message to every listener registered right now. Listeners are called outside
    /// the lock so they may (un)register themselves.
    pub fn dispatch(&self, message: &DirectMessage, sender: &NodeAddress) -> usize {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners.iter() {
            listener.on_direct_message(message.clone(), sender.clone());
        }
        listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OfferAvailabilityRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl DirectMessageListener for Counter {
        fn on_direct_message(&self, _message: DirectMessage, _sender: NodeAddress) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn DirectMessageListener> = counter.clone();
        let other: Arc<dyn DirectMessageListener> = Arc::new(Counter::default());

        registry.add(listener.clone());
        registry.add(listener.clone());
        registry.add(other.clone());
        assert_eq!(2, registry.len());

        let message = DirectMessage::OfferAvailabilityRequest(OfferAvailabilityRequest {
            offer_id: "OFFER-1".into(),
            uid: "uid".into(),
        });
        registry.dispatch(&message, &NodeAddress::new("taker", 1));
        assert_eq!(1, counter.0.load(Ordering::SeqCst));

        registry.remove(&listener);
        registry.remove(&listener);
        assert_eq!(1, registry.len());

        registry.remove(&other);
        assert!(registry.is_empty());
    }
}
