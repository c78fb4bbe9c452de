use crate::{
    err::*,
    offer::{Offer, OfferState},
    p2p::{DirectMessageListener, P2pService},
    protocol::{
        validate_id, AvailabilityResult, DirectMessage, NodeAddress, OfferAvailabilityRequest,
        OfferAvailabilityResponse,
    },
    stopper::BasicStopper,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedSender},
    oneshot,
};

struct RequestForwarder {
    sender: UnboundedSender<(DirectMessage, NodeAddress)>,
}

impl DirectMessageListener for RequestForwarder {
    fn on_direct_message(&self, message: DirectMessage, sender: NodeAddress) {
        if let DirectMessage::OfferAvailabilityRequest(_) = &message {
            let _ = self.sender.send((message, sender));
        }
    }
}

/// Maker side of the availability check. Answers requests for the offers in its book.
///
/// Clones share the offer book and the ignore list, so offers can be added or taken while the
/// responder is serving.
#[derive(Clone)]
pub struct OfferAvailabilityResponder {
    p2p_service: Arc<dyn P2pService>,
    offers: Arc<Mutex<HashMap<String, Offer>>>,
    ignored_peers: Arc<Mutex<HashSet<NodeAddress>>>,
}

impl OfferAvailabilityResponder {
    pub fn new(p2p_service: Arc<dyn P2pService>) -> Self {
        OfferAvailabilityResponder {
            p2p_service,
            offers: Arc::new(Mutex::new(HashMap::new())),
            ignored_peers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn add_offer(&self, offer: Offer) {
        self.offers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(offer.id().to_string(), offer);
    }

    pub fn remove_offer(&self, offer_id: &str) -> Option<Offer> {
        self.offers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(offer_id)
    }

    pub fn ignore_peer(&self, peer: NodeAddress) {
        self.ignored_peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer);
    }

    /// Decide the answer to a request from `peer`.
    pub fn availability(&self, offer_id: &str, peer: &NodeAddress) -> AvailabilityResult {
        if self
            .ignored_peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(peer)
        {
            return AvailabilityResult::UserIgnored;
        }

        let offers = self.offers.lock().unwrap_or_else(PoisonError::into_inner);
        match offers.get(offer_id).map(|offer| offer.state()) {
            Some(OfferState::Available) | Some(OfferState::OfferFeePaid) => {
                AvailabilityResult::Available
            }
            _ => AvailabilityResult::OfferTaken,
        }
    }

    /// Start answering requests. Stopping the returned stopper, or dropping it, unregisters the
    /// listener and ends the service.
    pub fn spawn(&self) -> BasicStopper {
        let (request_sender, mut request_receiver) = unbounded_channel();
        let listener: Arc<dyn DirectMessageListener> = Arc::new(RequestForwarder {
            sender: request_sender,
        });
        self.p2p_service.add_direct_message_listener(listener.clone());

        let (stop_sender, mut stop_receiver) = oneshot::channel::<()>();
        let responder = self.clone();

        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_receiver => break,
                    Some((message, sender)) = request_receiver.recv() => {
                        if let DirectMessage::OfferAvailabilityRequest(request) = message {
                            responder.respond(request, sender).await;
                        }
                    }
                }
            }
            responder
                .p2p_service
                .remove_direct_message_listener(&listener);
            debug!("OfferAvailabilityResponder stopped");
            ProtocolResult::Ok(())
        });

        BasicStopper::new(stop_sender, join_handle)
    }

    async fn respond(&self, request: OfferAvailabilityRequest, peer: NodeAddress) {
        if let Err(e) = validate_id(&request.offer_id) {
            warn!("Ignore OfferAvailabilityRequest from {}: {}", &peer, e);
            return;
        }

        let availability_result = self.availability(&request.offer_id, &peer);
        debug!(
            "OfferAvailabilityRequest for {} from {}: {:?}",
            &request.offer_id, &peer, availability_result
        );

        let response = DirectMessage::OfferAvailabilityResponse(OfferAvailabilityResponse {
            offer_id: request.offer_id,
            availability_result,
            uid: request.uid,
        });

        if let Err(e) = self.p2p_service.send_direct_message(&peer, response).await {
            warn!("Sending OfferAvailabilityResponse to {} failed: {}", &peer, e);
        }
    }
}
