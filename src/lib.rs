//! # Peer Protocol
//!
//! A small engine for request/response protocols between two peers of a P2P overlay, and an
//! offer availability check built on top of it.
//!
//! ## Protocol runs
//!
//! A protocol is two ordered lists of [`Task`]s: the request phase, run as soon as the protocol
//! is started, and the response phase, run once the awaited response from the peer arrived. Tasks
//! of a phase run one after the other against a shared model; the first failure ends the run.
//!
//! A [`ProtocolController`] drives one run. It registers for inbound messages, arms a deadline,
//! runs the request phase, filters inbound messages down to the awaited kind for its subject,
//! runs the response phase and finally reports exactly one of: result, error or nothing at all if
//! it was cancelled.
//!
//! ```ignore
//! let network = MemoryNetwork::new();
//! let taker = network.join(NodeAddress::new("taker", 9998));
//! let offer = Offer::new("OFFER-1", NodeAddress::new("maker", 9999));
//!
//! let model = OfferAvailabilityModel::new(offer.clone(), taker);
//! let config = ProtocolConfig::default();
//! let (handle, join_handle) = ProtocolController::new(OfferAvailabilityProtocol, model, config)
//!     .on_result(|| println!("checked"))
//!     .on_error(|e| println!("failed: {}", e))
//!     .spawn()?;
//!
//! handle.start()?;
//! let outcome = join_handle.await?;
//! ```
//!
//! ## Timeouts
//!
//! Each run has one deadline, 60 seconds by default. It is armed when the run starts and
//! re-armed when the response arrives, so the response phase gets the full timeout of its own.
//! If the deadline passes the run fails with [`ProtocolError::Timeout`].
//!
//! ## Cancellation
//!
//! [`ProtocolHandle::cancel`] ends a run immediately. Its listener and timer are released and
//! neither handler is called, even if a response or a task signal was already on its way.
//!
//! ## Offer availability
//!
//! [`OfferAvailabilityProtocol`] is the taker side: send an `OfferAvailabilityRequest` to the
//! maker, then mark the offer `Available` or `NotAvailable` from the `OfferAvailabilityResponse`.
//! [`OfferAvailabilityResponder`] is the maker side answering from its book of open offers.
//!
//! ## In-memory overlay
//!
//! [`MemoryNetwork`] implements the overlay in process. Messages travel as CBOR frames and are
//! delivered from background tasks after a configurable latency. Nodes can be taken offline, or
//! made to drop or duplicate what they receive.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

pub mod availability;
pub mod config;
pub mod controller;
pub mod correlator;
pub(crate) mod debug;
pub(crate) mod err;
pub mod offer;
pub mod p2p;
pub mod prelude;
pub mod protocol;
mod stopper;
pub mod task;
pub mod timeout;


pub use availability::{
    check_offer_availability, OfferAvailabilityModel, OfferAvailabilityProtocol,
    OfferAvailabilityResponder,
};
pub use config::ProtocolConfig;
pub use controller::{
    Protocol, ProtocolController, ProtocolHandle, ProtocolModel, ProtocolOutcome, ProtocolState,
};
pub use correlator::{Correlation, MessageCorrelator};
pub use err::*;
pub use offer::{Offer, OfferState};
pub use p2p::{cbor_codec::CborCodec, memory::MemoryNetwork, DirectMessageListener, P2pService};
pub use protocol::{AvailabilityResult, DirectMessage, MessageKind, NodeAddress};
pub use stopper::{BasicStopper, Stopper};
pub use task::{Task, TaskHandle, TaskRunner};
pub use timeout::TimeoutGuard;
