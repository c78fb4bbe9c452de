use super::{
    ErrorMessageHandler, Protocol, ProtocolController, ProtocolHandle, ProtocolModel,
    ProtocolOutcome, ProtocolState, ResultHandler,
};
use crate::{
    correlator::{Correlation, MessageCorrelator},
    err::*,
    p2p::DirectMessageListener,
    protocol::{DirectMessage, NodeAddress},
    task::{RunnerId, RunnerStatus, Task, TaskEvent, TaskRunner},
    timeout::TimeoutGuard,
};
use std::sync::Arc;
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};

pub(crate) enum Command {
    Start,
    Cancel,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Phase {
    Request,
    Response,
}

/// Hands inbound messages from the overlay's threads over to the run's event loop.
struct InboundForwarder {
    sender: UnboundedSender<(DirectMessage, NodeAddress)>,
}

impl DirectMessageListener for InboundForwarder {
    fn on_direct_message(&self, message: DirectMessage, sender: NodeAddress) {
        // the run may have ended already, then nobody cares
        let _ = self.sender.send((message, sender));
    }
}

pub(crate) struct ControllerCore<P: Protocol> {
    protocol: P,
    model: P::Model,
    correlator: MessageCorrelator,
    timeout: TimeoutGuard,
    runner: Option<(Phase, TaskRunner<P::Model>)>,
    next_runner_id: RunnerId,
    response_phase_started: bool,
    listener: Arc<dyn DirectMessageListener>,
    listener_registered: bool,
    inbound_receiver: UnboundedReceiver<(DirectMessage, NodeAddress)>,
    task_event_sender: UnboundedSender<TaskEvent>,
    task_event_receiver: UnboundedReceiver<TaskEvent>,
    command_receiver: UnboundedReceiver<Command>,
    commands_open: bool,
    state: watch::Sender<ProtocolState>,
    result_handler: Option<ResultHandler>,
    error_handler: Option<ErrorMessageHandler>,
    outcome: Option<ProtocolOutcome>,
}

impl<P: Protocol> ControllerCore<P> {
    pub(crate) fn start(
        controller: ProtocolController<P>,
    ) -> (ProtocolHandle, JoinHandle<ProtocolOutcome>) {
        let (command_sender, command_receiver) = unbounded_channel();
        let (inbound_sender, inbound_receiver) = unbounded_channel();
        let (task_event_sender, task_event_receiver) = unbounded_channel();
        let (state_sender, state_receiver) = watch::channel(ProtocolState::Idle);

        let correlator = MessageCorrelator::new(
            controller.protocol.awaited_message(),
            controller.model.subject_id(),
        );

        let core = ControllerCore {
            correlator,
            timeout: TimeoutGuard::new(controller.config.timeout()),
            protocol: controller.protocol,
            model: controller.model,
            runner: None,
            next_runner_id: 0,
            response_phase_started: false,
            listener: Arc::new(InboundForwarder {
                sender: inbound_sender,
            }),
            listener_registered: false,
            inbound_receiver,
            task_event_sender,
            task_event_receiver,
            command_receiver,
            commands_open: true,
            state: state_sender,
            result_handler: controller.result_handler,
            error_handler: controller.error_handler,
            outcome: None,
        };

        let join_handle = tokio::spawn(async move { core.main_loop().await });

        let handle = ProtocolHandle {
            command_sender,
            state: state_receiver,
        };

        (handle, join_handle)
    }

    async fn main_loop(mut self) -> ProtocolOutcome {
        loop {
            if let Some(outcome) = self.outcome.take() {
                return outcome;
            }

            tokio::select! {
                // start or cancel from the caller
                command = self.command_receiver.recv(), if self.commands_open => {
                    self.on_command(command);
                },
                // a task of the current phase signalled
                Some(event) = self.task_event_receiver.recv() => {
                    self.on_task_event(event);
                },
                // message from the overlay
                Some((message, sender)) = self.inbound_receiver.recv() => {
                    self.on_message(message, sender);
                },
                _ = self.timeout.expired() => {
                    self.on_timeout();
                }
            }
        }
    }

    fn on_command(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Start) => self.start_protocol(),
            Some(Command::Cancel) => self.cancel(),
            None => {
                self.commands_open = false;
                if self.current_state() == ProtocolState::Idle {
                    debug!("{}: all handles dropped before start", self.protocol.name());
                    self.cancel();
                }
            }
        }
    }

    fn start_protocol(&mut self) {
        let state = self.current_state();
        if state != ProtocolState::Idle {
            warn!("{}: start ignored in state {:?}", self.protocol.name(), state);
            return;
        }

        debug!(
            "{}: start for subject {}",
            self.protocol.name(),
            self.correlator.subject_id()
        );

        self.model.reset_subject_state();
        self.model
            .p2p_service()
            .add_direct_message_listener(self.listener.clone());
        self.listener_registered = true;
        self.set_state(ProtocolState::AwaitingResponse);

        if let Err(e) = self.model.resolve_peer_address() {
            self.fail(e);
            return;
        }

        if let Err(e) = self.timeout.start() {
            self.fail(e);
            return;
        }

        let tasks = self.protocol.request_tasks();
        self.run_phase(Phase::Request, tasks);
    }

    fn on_message(&mut self, message: DirectMessage, sender: NodeAddress) {
        if self.current_state() != ProtocolState::AwaitingResponse {
            trace!(
                "{}: ignored {} from {}, not awaiting a response",
                self.protocol.name(),
                message.kind(),
                sender
            );
            return;
        }

        match self
            .correlator
            .correlate(&message, &sender, self.model.request_uid())
        {
            Correlation::Match => {}
            correlation => {
                trace!(
                    "{}: ignored {} for {} from {}: {:?}",
                    self.protocol.name(),
                    message.kind(),
                    message.subject_id(),
                    sender,
                    correlation
                );
                return;
            }
        }

        if self.response_phase_started {
            debug!(
                "{}: ignored duplicate {} from {}",
                self.protocol.name(),
                message.kind(),
                sender
            );
            return;
        }

        trace!("{}: handle {} from {}", self.protocol.name(), message.kind(), sender);

        // the response phase gets a fresh deadline
        self.timeout.restart();
        self.model.set_message(message, sender);

        if let Some((_, mut runner)) = self.runner.take() {
            runner.cancel();
        }

        self.response_phase_started = true;
        let tasks = self.protocol.response_tasks();
        self.run_phase(Phase::Response, tasks);
    }

    fn on_task_event(&mut self, event: TaskEvent) {
        let status = match self.runner.as_mut() {
            Some((_, runner)) => runner.handle_event(&mut self.model, event),
            None => {
                trace!(
                    "{}: ignored signal of finished runner #{}",
                    self.protocol.name(),
                    event.runner_id()
                );
                return;
            }
        };
        self.on_runner_status(status);
    }

    fn on_timeout(&mut self) {
        if self.current_state() != ProtocolState::AwaitingResponse {
            return;
        }
        debug!(
            "{}: timeout reached for subject {}",
            self.protocol.name(),
            self.correlator.subject_id()
        );
        self.fail(ProtocolError::Timeout);
    }

    fn run_phase(&mut self, phase: Phase, tasks: Vec<Box<dyn Task<P::Model>>>) {
        self.next_runner_id += 1;
        let mut runner = TaskRunner::new(self.next_runner_id, self.task_event_sender.clone());

        if let Err(e) = runner.add_tasks(tasks) {
            self.fail(e);
            return;
        }

        debug!(
            "{}: {:?} phase on runner #{}",
            self.protocol.name(),
            phase,
            runner.id()
        );

        match runner.run(&mut self.model) {
            Ok(status) => {
                self.runner = Some((phase, runner));
                self.on_runner_status(status);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_runner_status(&mut self, status: RunnerStatus) {
        match status {
            RunnerStatus::Running | RunnerStatus::Ignored => {}
            RunnerStatus::Completed => match self.runner.take() {
                Some((Phase::Request, _)) => {
                    debug!(
                        "{}: request sequence completed, awaiting response",
                        self.protocol.name()
                    );
                }
                Some((Phase::Response, _)) => {
                    debug!("{}: response sequence completed", self.protocol.name());
                    self.finish(ProtocolOutcome::Completed);
                }
                None => {}
            },
            RunnerStatus::Failed(e) => {
                self.runner = None;
                self.fail(e);
            }
        }
    }

    fn fail(&mut self, error: ProtocolError) {
        if self.current_state().is_terminal() {
            return;
        }
        self.cancel_runner();
        match &error {
            ProtocolError::Timeout => self.model.on_timeout(),
            _ => self.model.on_task_failure(&error),
        }
        error!("{}: {}", self.protocol.name(), &error);
        self.finish(ProtocolOutcome::Failed(error));
    }

    fn cancel(&mut self) {
        if self.current_state().is_terminal() {
            return;
        }
        debug!("{}: cancelled", self.protocol.name());
        self.cancel_runner();
        self.finish(ProtocolOutcome::Cancelled);
    }

    fn cancel_runner(&mut self) {
        if let Some((_, mut runner)) = self.runner.take() {
            runner.cancel();
        }
    }

    fn cleanup(&mut self) {
        self.timeout.stop();
        if self.listener_registered {
            self.model
                .p2p_service()
                .remove_direct_message_listener(&self.listener);
            self.listener_registered = false;
        }
    }

    /// Move to a terminal state and call the matching handler. Only the first call has effect.
    fn finish(&mut self, outcome: ProtocolOutcome) {
        if self.current_state().is_terminal() {
            return;
        }

        self.cleanup();

        let state = match &outcome {
            ProtocolOutcome::Completed => ProtocolState::Completed,
            ProtocolOutcome::Failed(_) => ProtocolState::Failed,
            ProtocolOutcome::Cancelled => ProtocolState::Cancelled,
        };
        self.set_state(state);

        let result_handler = self.result_handler.take();
        let error_handler = self.error_handler.take();
        match &outcome {
            ProtocolOutcome::Completed => {
                if let Some(handler) = result_handler {
                    handler();
                }
            }
            ProtocolOutcome::Failed(e) => {
                if let Some(handler) = error_handler {
                    handler(e.to_string());
                }
            }
            ProtocolOutcome::Cancelled => {}
        }

        self.outcome = Some(outcome);
    }

    fn current_state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    fn set_state(&mut self, state: ProtocolState) {
        self.state.send_replace(state);
    }
}
