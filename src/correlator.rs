use crate::protocol::{validate_id, DirectMessage, MessageKind, NodeAddress};

/// Why a message was or wasn't routed to a protocol instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Correlation {
    Match,
    WrongKind,
    WrongSubject,
    /// Answer to a request this run did not send.
    WrongUid,
    InvalidId,
}

/// Decides which inbound messages belong to one protocol instance: those of the awaited kind
/// that declare the instance's subject id and answer the request it sent.
#[derive(Clone, Debug)]
pub struct MessageCorrelator {
    awaited: MessageKind,
    subject_id: String,
}

impl MessageCorrelator {
    pub fn new(awaited: MessageKind, subject_id: impl Into<String>) -> MessageCorrelator {
        MessageCorrelator {
            awaited,
            subject_id: subject_id.into(),
        }
    }

    pub fn awaited(&self) -> MessageKind {
        self.awaited
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// `request_uid` is the uid of the request sent by this run, if any. Without one, uids are
    /// not checked.
    pub fn correlate(
        &self,
        message: &DirectMessage,
        sender: &NodeAddress,
        request_uid: Option<&str>,
    ) -> Correlation {
        if let Err(e) = validate_id(message.subject_id()) {
            warn!("Rejected {} from {}: {}", message.kind(), sender, e);
            return Correlation::InvalidId;
        }
        if message.kind() != self.awaited {
            return Correlation::WrongKind;
        }
        if message.subject_id() != self.subject_id {
            return Correlation::WrongSubject;
        }
        if let Some(uid) = request_uid {
            if message.uid() != uid {
                return Correlation::WrongUid;
            }
        }
        Correlation::Match
    }

    pub fn matches(
        &self,
        message: &DirectMessage,
        sender: &NodeAddress,
        request_uid: Option<&str>,
    ) -> bool {
        self.correlate(message, sender, request_uid) == Correlation::Match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AvailabilityResult, OfferAvailabilityRequest, OfferAvailabilityResponse};

    fn response(offer_id: &str) -> DirectMessage {
        response_to(offer_id, "uid")
    }

    fn response_to(offer_id: &str, uid: &str) -> DirectMessage {
        DirectMessage::OfferAvailabilityResponse(OfferAvailabilityResponse {
            offer_id: offer_id.into(),
            availability_result: AvailabilityResult::Available,
            uid: uid.into(),
        })
    }

    #[test]
    fn correlates_by_kind_and_subject() {
        let sender = NodeAddress::new("maker", 9999);
        let correlator = MessageCorrelator::new(MessageKind::OfferAvailabilityResponse, "OFFER-1");

        assert_eq!(Correlation::Match, correlator.correlate(&response("OFFER-1"), &sender, None));
        assert_eq!(
            Correlation::WrongSubject,
            correlator.correlate(&response("OFFER-2"), &sender, None)
        );

        let request = DirectMessage::OfferAvailabilityRequest(OfferAvailabilityRequest {
            offer_id: "OFFER-1".into(),
            uid: "uid".into(),
        });
        assert_eq!(Correlation::WrongKind, correlator.correlate(&request, &sender, None));
    }

    #[test]
    fn rejects_invalid_ids() {
        let sender = NodeAddress::new("maker", 9999);
        let correlator = MessageCorrelator::new(MessageKind::OfferAvailabilityResponse, "OFFER-1");

        assert_eq!(Correlation::InvalidId, correlator.correlate(&response(""), &sender, None));
        assert!(!correlator.matches(&response("OFFER 1"), &sender, None));
    }

    #[test]
    fn rejects_answers_to_other_requests() {
        let sender = NodeAddress::new("maker", 9999);
        let correlator = MessageCorrelator::new(MessageKind::OfferAvailabilityResponse, "OFFER-1");

        assert_eq!(
            Correlation::Match,
            correlator.correlate(&response_to("OFFER-1", "abc"), &sender, Some("abc"))
        );
        assert_eq!(
            Correlation::WrongUid,
            correlator.correlate(&response_to("OFFER-1", "old"), &sender, Some("abc"))
        );
    }
}
