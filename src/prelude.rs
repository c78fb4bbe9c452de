pub use crate::availability::{
    check_offer_availability, OfferAvailabilityModel, OfferAvailabilityProtocol,
    OfferAvailabilityResponder,
};
pub use crate::config::ProtocolConfig;
pub use crate::controller::{
    Protocol, ProtocolController, ProtocolHandle, ProtocolModel, ProtocolOutcome, ProtocolState,
};
pub use crate::err::*;
pub use crate::offer::{Offer, OfferState};
pub use crate::p2p::{memory::MemoryNetwork, P2pService};
pub use crate::protocol::{AvailabilityResult, DirectMessage, NodeAddress};
pub use crate::stopper::Stopper;
pub use crate::task::{Task, TaskHandle};
