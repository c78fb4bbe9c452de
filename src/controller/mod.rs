//! Drives one protocol run from start to a terminal outcome.
//!
//! ```text
//!          start                 correlated response
//!  Idle ──────────> AwaitingResponse ─────────────────> (response phase) ──> Completed
//!   │                 │    │                                   │
//!   │ cancel          │    │ request phase fails / timeout     │ fails / timeout
//!   v                 │    v                                   v
//! Cancelled <─────────┘  Failed <──────────────────────────── Failed
//! ```
//!
//! A run is spawned as its own task which owns the model, the listener registration and the
//! timer. Everything that touches the model happens on that task: task signals, inbound messages
//! and timer expiry are all queued to it and handled one at a time.

mod core;

use self::core::{Command, ControllerCore};
use crate::{
    config::ProtocolConfig,
    err::*,
    p2p::P2pService,
    protocol::{DirectMessage, MessageKind, NodeAddress},
    task::Task,
};
use std::sync::Arc;
use tokio::{
    sync::{mpsc::UnboundedSender, watch},
    task::JoinHandle,
};

/// State shared by the tasks of one protocol run.
pub trait ProtocolModel: Send + 'static {
    /// Id of the subject under negotiation, used to correlate inbound messages.
    fn subject_id(&self) -> &str;

    fn p2p_service(&self) -> &Arc<dyn P2pService>;

    /// Put the subject back into its undefined state before a run starts.
    fn reset_subject_state(&mut self);

    fn resolve_peer_address(&mut self) -> ProtocolResult<()>;

    /// Uid of the request this run sent. Responses must echo it to be accepted.
    fn request_uid(&self) -> Option<&str> {
        None
    }

    /// Store a correlated inbound message for the response tasks.
    fn set_message(&mut self, message: DirectMessage, sender: NodeAddress);

    /// The peer did not answer in time. Mark the subject accordingly.
    fn on_timeout(&mut self);

    /// A task failed. The subject must be left in an explicit state, never undefined.
    fn on_task_failure(&mut self, error: &ProtocolError);
}

/// A request/response protocol: which message it waits for and the tasks of its two phases.
pub trait Protocol: Send + 'static {
    type Model: ProtocolModel;

    fn name(&self) -> &'static str;

    fn awaited_message(&self) -> MessageKind;

    fn request_tasks(&self) -> Vec<Box<dyn Task<Self::Model>>>;

    fn response_tasks(&self) -> Vec<Box<dyn Task<Self::Model>>>;
}

#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Debug)]
pub enum ProtocolState {
    Idle,
    AwaitingResponse,
    Completed,
    Failed,
    Cancelled,
}

impl ProtocolState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProtocolState::Completed | ProtocolState::Failed | ProtocolState::Cancelled
        )
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
pub enum ProtocolOutcome {
    Completed,
    Failed(ProtocolError),
    Cancelled,
}

pub type ResultHandler = Box<dyn FnOnce() + Send>;
pub type ErrorMessageHandler = Box<dyn FnOnce(String) + Send>;

/// One negotiation attempt. Configure the handlers, then `spawn` and `start` it.
pub struct ProtocolController<P: Protocol> {
    protocol: P,
    model: P::Model,
    config: ProtocolConfig,
    result_handler: Option<ResultHandler>,
    error_handler: Option<ErrorMessageHandler>,
}

impl<P: Protocol> ProtocolController<P> {
    pub fn new(protocol: P, model: P::Model, config: ProtocolConfig) -> Self {
        ProtocolController {
            protocol,
            model,
            config,
            result_handler: None,
            error_handler: None,
        }
    }

    /// Called once if the run completes.
    pub fn on_result(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.result_handler = Some(Box::new(handler));
        self
    }

    /// Called once with a human readable message if a task fails or the peer times out.
    pub fn on_error(mut self, handler: impl FnOnce(String) + Send + 'static) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Spawn the run's event loop. Nothing happens until [`ProtocolHandle::start`].
    ///
    /// Fails with `InvalidConfig` if the config does not validate.
    pub fn spawn(self) -> ProtocolResult<(ProtocolHandle, JoinHandle<ProtocolOutcome>)> {
        self.config.validate()?;
        Ok(ControllerCore::start(self))
    }
}

/// Caller side of a spawned protocol run.
///
/// Dropping every handle before `start` cancels the run. Dropping them afterwards lets the run
/// finish on its own.
#[derive(Clone)]
pub struct ProtocolHandle {
    command_sender: UnboundedSender<Command>,
    state: watch::Receiver<ProtocolState>,
}

impl ProtocolHandle {
    pub fn start(&self) -> ProtocolResult<()> {
        let state = self.state();
        if state != ProtocolState::Idle {
            return Err(ProtocolError::InvalidState {
                state: format!("{:?}", state),
                operation: "start".to_string(),
            });
        }
        self.command_sender.send(Command::Start)?;
        Ok(())
    }

    /// Abort the run. No handler is called afterwards. Does nothing once the run has ended.
    pub fn cancel(&self) {
        // ignore error, the run has already ended
        let _ = self.command_sender.send(Command::Cancel);
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProtocolState> {
        self.state.clone()
    }

    /// Wait until the run reaches a terminal state.
    pub async fn wait_terminal(&self) -> ProtocolState {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if state.changed().await.is_err() {
                return *state.borrow();
            }
        }
    }
}
