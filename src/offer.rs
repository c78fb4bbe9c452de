use crate::protocol::NodeAddress;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of an offer as seen by the local node.
#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Debug)]
pub enum OfferState {
    Undefined,
    OfferFeePaid,
    Available,
    NotAvailable,
    Removed,
    PeerUnreachable,
}

/// An offer being negotiated. Clones share the same lifecycle state, so a state change made
/// by a protocol run is visible to everyone holding the offer.
#[derive(Clone, Debug)]
pub struct Offer {
    id: String,
    maker_node_address: NodeAddress,
    state: Arc<watch::Sender<OfferState>>,
    error_message: Arc<watch::Sender<Option<String>>>,
}

impl Offer {
    pub fn new(id: impl Into<String>, maker_node_address: NodeAddress) -> Offer {
        Offer::with_state(id, maker_node_address, OfferState::Undefined)
    }

    pub fn with_state(
        id: impl Into<String>,
        maker_node_address: NodeAddress,
        state: OfferState,
    ) -> Offer {
        let (state, _) = watch::channel(state);
        let (error_message, _) = watch::channel(None);
        Offer {
            id: id.into(),
            maker_node_address,
            state: Arc::new(state),
            error_message: Arc::new(error_message),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn maker_node_address(&self) -> &NodeAddress {
        &self.maker_node_address
    }

    pub fn state(&self) -> OfferState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: OfferState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Offer {} state {:?} -> {:?}", self.id, previous, state);
        }
    }

    /// Watch the lifecycle state for changes.
    pub fn subscribe_state(&self) -> watch::Receiver<OfferState> {
        self.state.subscribe()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.borrow().clone()
    }

    pub fn set_error_message(&self, error_message: Option<String>) {
        self.error_message.send_replace(error_message);
    }
}

#[test]
fn test_clones_share_state() {
    let offer = Offer::new("OFFER-1", NodeAddress::new("maker", 9999));
    let clone = offer.clone();
    let mut receiver = offer.subscribe_state();

    clone.set_state(OfferState::Available);

    assert_eq!(OfferState::Available, offer.state());
    assert!(receiver.has_changed().unwrap());
    assert_eq!(OfferState::Available, *receiver.borrow_and_update());
}
