use crate::protocol::DirectMessage;

pub fn message_to_string(msg: &DirectMessage) -> String {
    match msg {
        DirectMessage::OfferAvailabilityRequest(params) => {
            format!("AVAIL_REQ {} #{}", &params.offer_id, &params.uid)
        }
        DirectMessage::OfferAvailabilityResponse(params) => format!(
            "AVAIL_RSP {} #{} {:?}",
            &params.offer_id, &params.uid, &params.availability_result
        ),
    }
}
