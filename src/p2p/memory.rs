use super::{cbor_codec::CborCodec, DirectMessageListener, ListenerRegistry, P2pService};
use crate::{
    debug::message_to_string,
    err::*,
    protocol::{DirectMessage, Envelope, NodeAddress},
};
use bytes::BytesMut;
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};
use tokio_util::codec::{Decoder, Encoder};

struct MemoryNode {
    listeners: ListenerRegistry,
    online: AtomicBool,
    dropping: AtomicBool,
    duplicating: AtomicBool,
}

impl MemoryNode {
    fn new() -> Self {
        MemoryNode {
            listeners: ListenerRegistry::new(),
            online: AtomicBool::new(true),
            dropping: AtomicBool::new(false),
            duplicating: AtomicBool::new(false),
        }
    }
}

/// An in-process overlay. Nodes join by address and exchange CBOR framed envelopes which are
/// delivered from background tasks after a configurable latency.
///
/// Faults can be injected per receiving node: offline (sends fail), dropping (sends succeed but
/// nothing arrives) and duplicating (everything arrives twice).
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<Mutex<HashMap<NodeAddress, Arc<MemoryNode>>>>,
    latency_ms: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> MemoryNetwork {
        MemoryNetwork::default()
    }

    /// Join the network at `address`. Joining an address twice returns a second handle to the
    /// same node.
    pub fn join(&self, address: NodeAddress) -> Arc<MemoryP2pService> {
        let node = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.clone())
            .or_insert_with(|| Arc::new(MemoryNode::new()))
            .clone();

        Arc::new(MemoryP2pService {
            address,
            network: self.clone(),
            node,
        })
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::SeqCst))
    }

    pub fn set_online(&self, address: &NodeAddress, online: bool) {
        if let Some(node) = self.node(address) {
            node.online.store(online, Ordering::SeqCst);
        }
    }

    pub fn set_dropping(&self, address: &NodeAddress, dropping: bool) {
        if let Some(node) = self.node(address) {
            node.dropping.store(dropping, Ordering::SeqCst);
        }
    }

    pub fn set_duplicating(&self, address: &NodeAddress, duplicating: bool) {
        if let Some(node) = self.node(address) {
            node.duplicating.store(duplicating, Ordering::SeqCst);
        }
    }

    /// Number of listeners currently registered at `address`.
    pub fn listener_count(&self, address: &NodeAddress) -> usize {
        self.node(address).map(|node| node.listeners.len()).unwrap_or(0)
    }

    fn node(&self, address: &NodeAddress) -> Option<Arc<MemoryNode>> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}

/// One node of a [`MemoryNetwork`].
pub struct MemoryP2pService {
    address: NodeAddress,
    network: MemoryNetwork,
    node: Arc<MemoryNode>,
}

impl MemoryP2pService {
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }
}

impl P2pService for MemoryP2pService {
    fn add_direct_message_listener(&self, listener: Arc<dyn DirectMessageListener>) {
        self.node.listeners.add(listener);
    }

    fn remove_direct_message_listener(&self, listener: &Arc<dyn DirectMessageListener>) {
        self.node.listeners.remove(listener);
    }

    fn send_direct_message(
        &self,
        peer: &NodeAddress,
        message: DirectMessage,
    ) -> BoxFuture<'static, ProtocolResult<()>> {
        let network = self.network.clone();
        let peer = peer.clone();
        let sender = self.address.clone();

        Box::pin(async move {
            let target = match network.node(&peer) {
                Some(target) if target.online.load(Ordering::SeqCst) => target,
                _ => return Err(ProtocolError::PeerUnreachable(peer.to_string())),
            };

            trace!("[{}] --> [{}] {}", &sender, &peer, message_to_string(&message));

            let mut frame = BytesMut::new();
            CborCodec::<Envelope, Envelope>::new().encode(Envelope { sender, message }, &mut frame)?;

            if target.dropping.load(Ordering::SeqCst) {
                trace!("[{}] dropped a message", &peer);
                return Ok(());
            }

            let copies = if target.duplicating.load(Ordering::SeqCst) { 2 } else { 1 };
            let latency = network.latency();

            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                for _ in 0..copies {
                    deliver(&target, &peer, frame.clone());
                }
            });

            Ok(())
        })
    }
}

fn deliver(target: &MemoryNode, address: &NodeAddress, mut frame: BytesMut) {
    if !target.online.load(Ordering::SeqCst) {
        trace!("[{}] went offline, message lost", address);
        return;
    }
    match CborCodec::<Envelope, Envelope>::new().decode(&mut frame) {
        Ok(Some(envelope)) => {
            let recipients = target.listeners.dispatch(&envelope.message, &envelope.sender);
            trace!(
                "[{}] <-- [{}] {} ({} listeners)",
                address,
                &envelope.sender,
                message_to_string(&envelope.message),
                recipients
            );
        }
        Ok(None) => warn!("[{}] received an incomplete frame", address),
        Err(e) => warn!("[{}] received a malformed frame: {}", address, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OfferAvailabilityRequest;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    struct Forward(UnboundedSender<(DirectMessage, NodeAddress)>);

    impl DirectMessageListener for Forward {
        fn on_direct_message(&self, message: DirectMessage, sender: NodeAddress) {
            let _ = self.0.send((message, sender));
        }
    }

    fn request() -> DirectMessage {
        DirectMessage::OfferAvailabilityRequest(OfferAvailabilityRequest {
            offer_id: "OFFER-1".into(),
            uid: "uid".into(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_after_latency() {
        let network = MemoryNetwork::new();
        network.set_latency(Duration::from_secs(1));
        let taker = network.join(NodeAddress::new("taker", 1));
        let maker = network.join(NodeAddress::new("maker", 2));

        let (sender, mut receiver) = unbounded_channel();
        maker.add_direct_message_listener(Arc::new(Forward(sender)));

        let start = tokio::time::Instant::now();
        taker.send_direct_message(maker.address(), request()).await.unwrap();
        let (message, from) = receiver.recv().await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(request(), message);
        assert_eq!(taker.address(), &from);
    }

    #[tokio::test]
    async fn unknown_or_offline_peer_is_unreachable() {
        let network = MemoryNetwork::new();
        let taker = network.join(NodeAddress::new("taker", 1));
        let maker = network.join(NodeAddress::new("maker", 2));

        let result = taker
            .send_direct_message(&NodeAddress::new("nobody", 3), request())
            .await;
        assert!(matches!(result, Err(ProtocolError::PeerUnreachable(_))));

        network.set_online(maker.address(), false);
        let result = taker.send_direct_message(maker.address(), request()).await;
        assert!(matches!(result, Err(ProtocolError::PeerUnreachable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_and_duplicating() {
        let network = MemoryNetwork::new();
        let taker = network.join(NodeAddress::new("taker", 1));
        let maker = network.join(NodeAddress::new("maker", 2));
        let (sender, mut receiver) = unbounded_channel();
        maker.add_direct_message_listener(Arc::new(Forward(sender)));

        network.set_dropping(maker.address(), true);
        taker.send_direct_message(maker.address(), request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(receiver.try_recv().is_err());

        network.set_dropping(maker.address(), false);
        network.set_duplicating(maker.address(), true);
        taker.send_direct_message(maker.address(), request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }
}
