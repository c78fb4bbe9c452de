use crate::err::{ProtocolError, ProtocolResult};
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref RGX_ID: Regex = Regex::new(r"^[A-Za-z0-9._-]{1,128}$").unwrap();
}

/// Check that `id` is usable as a correlation id: non-empty, at most 128 characters of `[A-Za-z0-9._-]`.
pub fn validate_id(id: &str) -> ProtocolResult<&str> {
    if !RGX_ID.is_match(id) {
        return Err(ProtocolError::InvalidId(id.to_string()));
    }
    Ok(id)
}

/// Address of a node on the overlay.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq, Hash, Debug)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Debug)]
pub enum MessageKind {
    OfferAvailabilityRequest,
    OfferAvailabilityResponse,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageKind::OfferAvailabilityRequest => write!(f, "OfferAvailabilityRequest"),
            MessageKind::OfferAvailabilityResponse => write!(f, "OfferAvailabilityResponse"),
        }
    }
}

/// The maker's verdict on an availability request.
#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Debug)]
pub enum AvailabilityResult {
    Available,
    OfferTaken,
    PriceOutOfTolerance,
    MarketPriceNotAvailable,
    NoArbitrators,
    NoMediators,
    UserIgnored,
    UnknownFailure,
}

impl AvailabilityResult {
    pub fn description(&self) -> &'static str {
        match self {
            AvailabilityResult::Available => "Offer is available",
            AvailabilityResult::OfferTaken => "Offer is already taken",
            AvailabilityResult::PriceOutOfTolerance => {
                "Cannot take offer because taker's price is outside tolerance"
            }
            AvailabilityResult::MarketPriceNotAvailable => {
                "Cannot take offer because market price for calculating trade price is unavailable"
            }
            AvailabilityResult::NoArbitrators => "No arbitrators available",
            AvailabilityResult::NoMediators => "No mediators available",
            AvailabilityResult::UserIgnored => "User is ignored",
            AvailabilityResult::UnknownFailure => "Cannot take offer for unknown reason",
        }
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
pub struct OfferAvailabilityRequest {
    pub offer_id: String,
    pub uid: String,
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
pub struct OfferAvailabilityResponse {
    pub offer_id: String,
    pub availability_result: AvailabilityResult,
    pub uid: String,
}

/// A decrypted direct message exchanged between two peers.
#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
pub enum DirectMessage {
    OfferAvailabilityRequest(OfferAvailabilityRequest),
    OfferAvailabilityResponse(OfferAvailabilityResponse),
}

impl DirectMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            DirectMessage::OfferAvailabilityRequest(_) => MessageKind::OfferAvailabilityRequest,
            DirectMessage::OfferAvailabilityResponse(_) => MessageKind::OfferAvailabilityResponse,
        }
    }

    /// The id of the offer this message is about, as declared by the sender.
    pub fn subject_id(&self) -> &str {
        match self {
            DirectMessage::OfferAvailabilityRequest(msg) => &msg.offer_id,
            DirectMessage::OfferAvailabilityResponse(msg) => &msg.offer_id,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            DirectMessage::OfferAvailabilityRequest(msg) => &msg.uid,
            DirectMessage::OfferAvailabilityResponse(msg) => &msg.uid,
        }
    }
}

/// Envelope in which direct messages travel over the overlay.
#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
pub struct Envelope {
    pub sender: NodeAddress,
    pub message: DirectMessage,
}

#[test]
fn test_validate_id() {
    assert!(validate_id("OFFER-1").is_ok());
    assert!(validate_id("a.b_c-9").is_ok());

    assert!(validate_id("").is_err());
    assert!(validate_id("OFFER 1").is_err());
    assert!(validate_id("OFFER/1").is_err());
    assert!(validate_id(&"x".repeat(129)).is_err());
    assert!(validate_id(&"x".repeat(128)).is_ok());
}

#[test]
fn test_subject_id() {
    let msg = DirectMessage::OfferAvailabilityResponse(OfferAvailabilityResponse {
        offer_id: "OFFER-1".into(),
        availability_result: AvailabilityResult::Available,
        uid: "u".into(),
    });
    assert_eq!("OFFER-1", msg.subject_id());
    assert_eq!(MessageKind::OfferAvailabilityResponse, msg.kind());
}
