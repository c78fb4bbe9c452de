//! The offer availability check: a taker asks the maker of an offer whether it can still be
//! taken, and marks the offer according to the answer.

mod responder;
mod tasks;

pub use responder::OfferAvailabilityResponder;
pub use tasks::{ProcessOfferAvailabilityResponse, SendOfferAvailabilityRequest};

use crate::{
    config::ProtocolConfig,
    controller::{Protocol, ProtocolController, ProtocolModel, ProtocolOutcome},
    err::*,
    offer::{Offer, OfferState},
    p2p::P2pService,
    protocol::{DirectMessage, MessageKind, NodeAddress, OfferAvailabilityResponse},
    task::Task,
};
use std::sync::Arc;

/// Taker side state of one availability check.
pub struct OfferAvailabilityModel {
    offer: Offer,
    p2p_service: Arc<dyn P2pService>,
    peer_node_address: Option<NodeAddress>,
    message: Option<OfferAvailabilityResponse>,
    request_uid: Option<String>,
}

impl OfferAvailabilityModel {
    pub fn new(offer: Offer, p2p_service: Arc<dyn P2pService>) -> Self {
        OfferAvailabilityModel {
            offer,
            p2p_service,
            peer_node_address: None,
            message: None,
            request_uid: None,
        }
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn peer_node_address(&self) -> Option<&NodeAddress> {
        self.peer_node_address.as_ref()
    }

    /// The correlated response, once one arrived.
    pub fn message(&self) -> Option<&OfferAvailabilityResponse> {
        self.message.as_ref()
    }

    pub(crate) fn set_request_uid(&mut self, uid: String) {
        self.request_uid = Some(uid);
    }
}

impl ProtocolModel for OfferAvailabilityModel {
    fn subject_id(&self) -> &str {
        self.offer.id()
    }

    fn p2p_service(&self) -> &Arc<dyn P2pService> {
        &self.p2p_service
    }

    fn reset_subject_state(&mut self) {
        self.offer.set_state(OfferState::Undefined);
        self.offer.set_error_message(None);
    }

    fn resolve_peer_address(&mut self) -> ProtocolResult<()> {
        match self.p2p_service.resolve_peer_address(&self.offer) {
            Some(address) => {
                self.peer_node_address = Some(address);
                Ok(())
            }
            None => Err(ProtocolError::PeerAddressUnknown(self.offer.id().to_string())),
        }
    }

    fn request_uid(&self) -> Option<&str> {
        self.request_uid.as_deref()
    }

    fn set_message(&mut self, message: DirectMessage, sender: NodeAddress) {
        match message {
            DirectMessage::OfferAvailabilityResponse(response) => self.message = Some(response),
            other => warn!("Unexpected {} from {} stored on model", other.kind(), sender),
        }
    }

    fn on_timeout(&mut self) {
        self.offer.set_state(OfferState::PeerUnreachable);
        self.offer
            .set_error_message(Some(ProtocolError::Timeout.to_string()));
    }

    fn on_task_failure(&mut self, error: &ProtocolError) {
        match error {
            // the request never left, the maker is out of reach
            ProtocolError::TaskFailed { task, .. }
                if task == SendOfferAvailabilityRequest::NAME =>
            {
                self.offer.set_state(OfferState::PeerUnreachable)
            }
            _ if self.offer.state() == OfferState::Undefined => {
                self.offer.set_state(OfferState::NotAvailable)
            }
            _ => {}
        }
        self.offer.set_error_message(Some(error.to_string()));
    }
}

/// Request the availability of an offer from its maker, then process the answer.
pub struct OfferAvailabilityProtocol;

impl Protocol for OfferAvailabilityProtocol {
    type Model = OfferAvailabilityModel;

    fn name(&self) -> &'static str {
        "OfferAvailabilityProtocol"
    }

    fn awaited_message(&self) -> MessageKind {
        MessageKind::OfferAvailabilityResponse
    }

    fn request_tasks(&self) -> Vec<Box<dyn Task<OfferAvailabilityModel>>> {
        vec![Box::new(SendOfferAvailabilityRequest)]
    }

    fn response_tasks(&self) -> Vec<Box<dyn Task<OfferAvailabilityModel>>> {
        vec![Box::new(ProcessOfferAvailabilityResponse)]
    }
}

/// Run an availability check to the end and return the offer's resulting state.
///
/// An offer the maker reports as unavailable is a successful check returning
/// [`OfferState::NotAvailable`]. Send failures and timeouts are returned as errors; the offer's
/// state is updated in those cases too.
///
/// ```ignore
/// let network = MemoryNetwork::new();
/// let taker = network.join(NodeAddress::new("taker", 9998));
/// let offer = Offer::new("OFFER-1", NodeAddress::new("maker", 9999));
/// let state = check_offer_availability(offer, taker, ProtocolConfig::default()).await?;
/// ```
pub async fn check_offer_availability(
    offer: Offer,
    p2p_service: Arc<dyn P2pService>,
    config: ProtocolConfig,
) -> ProtocolResult<OfferState> {
    let model = OfferAvailabilityModel::new(offer.clone(), p2p_service);
    let (handle, join_handle) =
        ProtocolController::new(OfferAvailabilityProtocol, model, config).spawn()?;
    handle.start()?;

    match join_handle.await? {
        ProtocolOutcome::Completed => Ok(offer.state()),
        ProtocolOutcome::Failed(e) => Err(e),
        ProtocolOutcome::Cancelled => Err(ProtocolError::InternalError(format!(
            "availability check of offer {} was cancelled",
            offer.id()
        ))),
    }
}
