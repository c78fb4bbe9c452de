use super::OfferAvailabilityModel;
use crate::{
    controller::ProtocolModel,
    offer::OfferState,
    protocol::{AvailabilityResult, DirectMessage, OfferAvailabilityRequest},
    task::{Task, TaskHandle},
};
use uuid::Uuid;

/// Send an availability request for the model's offer to the resolved maker.
///
/// A failure of this task means the maker could not be reached.
pub struct SendOfferAvailabilityRequest;

impl SendOfferAvailabilityRequest {
    pub const NAME: &'static str = "SendOfferAvailabilityRequest";
}

impl Task<OfferAvailabilityModel> for SendOfferAvailabilityRequest {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, model: &mut OfferAvailabilityModel, handle: TaskHandle) {
        let peer = match model.peer_node_address() {
            Some(peer) => peer.clone(),
            None => {
                handle.failed("Peer node address is not resolved");
                return;
            }
        };

        let uid = Uuid::new_v4().to_string();
        model.set_request_uid(uid.clone());

        let message = DirectMessage::OfferAvailabilityRequest(OfferAvailabilityRequest {
            offer_id: model.offer().id().to_string(),
            uid,
        });

        debug!("Send {} for offer {} to {}", message.kind(), model.offer().id(), &peer);

        let send = model.p2p_service().send_direct_message(&peer, message);

        // only signal from here, the model is updated by the run's event loop
        tokio::spawn(async move {
            match send.await {
                Ok(()) => {
                    trace!("OfferAvailabilityRequest to {} accepted by overlay", &peer);
                    handle.complete();
                }
                Err(e) => handle.failed(format!("Sending OfferAvailabilityRequest failed: {}", e)),
            }
        });
    }
}

/// Apply the maker's answer to the offer.
pub struct ProcessOfferAvailabilityResponse;

impl Task<OfferAvailabilityModel> for ProcessOfferAvailabilityResponse {
    fn name(&self) -> &'static str {
        "ProcessOfferAvailabilityResponse"
    }

    fn run(&self, model: &mut OfferAvailabilityModel, handle: TaskHandle) {
        let response = match model.message() {
            Some(response) => response.clone(),
            None => {
                handle.failed("No OfferAvailabilityResponse received");
                return;
            }
        };

        let offer = model.offer();
        if response.offer_id != offer.id() {
            handle.failed(format!(
                "Response is for offer {} but offer {} was requested",
                &response.offer_id,
                offer.id()
            ));
            return;
        }

        if model.request_uid() != Some(response.uid.as_str()) {
            handle.failed(format!(
                "Invalid correlation id: response uid {} does not answer request uid {:?}",
                &response.uid,
                model.request_uid()
            ));
            return;
        }

        match response.availability_result {
            AvailabilityResult::Available => offer.set_state(OfferState::Available),
            result => {
                offer.set_state(OfferState::NotAvailable);
                offer.set_error_message(Some(result.description().to_string()));
            }
        }

        handle.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        offer::Offer,
        p2p::memory::MemoryNetwork,
        protocol::{NodeAddress, OfferAvailabilityResponse},
        task::{RunnerStatus, TaskRunner},
    };
    use tokio::sync::mpsc::unbounded_channel;

    fn model(offer_id: &str) -> OfferAvailabilityModel {
        let network = MemoryNetwork::new();
        let taker = network.join(NodeAddress::new("taker", 9998));
        OfferAvailabilityModel::new(Offer::new(offer_id, NodeAddress::new("maker", 9999)), taker)
    }

    fn response(offer_id: &str, result: AvailabilityResult) -> DirectMessage {
        DirectMessage::OfferAvailabilityResponse(OfferAvailabilityResponse {
            offer_id: offer_id.into(),
            availability_result: result,
            uid: "uid".into(),
        })
    }

    fn process(model: &mut OfferAvailabilityModel) -> RunnerStatus {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        runner
            .add_tasks(vec![Box::new(ProcessOfferAvailabilityResponse) as Box<dyn Task<_>>])
            .unwrap();
        assert_eq!(RunnerStatus::Running, runner.run(model).unwrap());
        let event = receiver.try_recv().unwrap();
        runner.handle_event(model, event)
    }

    #[tokio::test]
    async fn taken_offer_is_not_available() {
        let mut model = model("OFFER-1");
        model.set_request_uid("uid".into());
        model.set_message(
            response("OFFER-1", AvailabilityResult::OfferTaken),
            NodeAddress::new("maker", 9999),
        );

        assert_eq!(RunnerStatus::Completed, process(&mut model));
        assert_eq!(OfferState::NotAvailable, model.offer().state());
        assert_eq!(
            Some("Offer is already taken".to_string()),
            model.offer().error_message()
        );
    }

    #[tokio::test]
    async fn response_for_other_offer_fails() {
        let mut model = model("OFFER-1");
        model.set_message(
            response("OFFER-2", AvailabilityResult::Available),
            NodeAddress::new("maker", 9999),
        );

        assert!(matches!(process(&mut model), RunnerStatus::Failed(_)));
        assert_eq!(OfferState::Undefined, model.offer().state());
    }

    #[tokio::test]
    async fn response_to_other_request_fails() {
        let mut model = model("OFFER-1");
        model.set_request_uid("current".into());
        model.set_message(
            response("OFFER-1", AvailabilityResult::Available),
            NodeAddress::new("maker", 9999),
        );

        match process(&mut model) {
            RunnerStatus::Failed(e) => assert!(e.to_string().contains("Invalid correlation id")),
            status => panic!("unexpected {:?}", status),
        }
        assert_eq!(OfferState::Undefined, model.offer().state());
    }

    #[tokio::test]
    async fn send_without_peer_address_fails() {
        let mut model = model("OFFER-1");
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        runner
            .add_tasks(vec![Box::new(SendOfferAvailabilityRequest) as Box<dyn Task<_>>])
            .unwrap();
        runner.run(&mut model).unwrap();
        let event = receiver.try_recv().unwrap();

        match runner.handle_event(&mut model, event) {
            RunnerStatus::Failed(e) => assert!(e.to_string().contains("not resolved")),
            status => panic!("unexpected {:?}", status),
        }
        assert!(model.request_uid().is_none());
    }
}
