use super::{RunnerId, Task, TaskEvent, TaskHandle, TaskOutcome};
use crate::err::{ProtocolError, ProtocolResult};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedSender;

/// What a runner reports back after being started or fed an event.
#[derive(Debug, PartialEq)]
pub enum RunnerStatus {
    /// A task is in flight.
    Running,
    /// The last task completed.
    Completed,
    /// A task failed, the sequence was halted.
    Failed(ProtocolError),
    /// The event was stale and changed nothing.
    Ignored,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum RunnerState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Runs an ordered sequence of tasks against one model, one task at a time.
pub struct TaskRunner<M> {
    id: RunnerId,
    tasks: Vec<Box<dyn Task<M>>>,
    cursor: usize,
    state: RunnerState,
    cancelled: Arc<AtomicBool>,
    event_sender: UnboundedSender<TaskEvent>,
}

impl<M> TaskRunner<M> {
    pub fn new(id: RunnerId, event_sender: UnboundedSender<TaskEvent>) -> TaskRunner<M> {
        TaskRunner {
            id,
            tasks: vec![],
            cursor: 0,
            state: RunnerState::Pending,
            cancelled: Arc::new(AtomicBool::new(false)),
            event_sender,
        }
    }

    pub fn id(&self) -> RunnerId {
        self.id
    }

    /// Append tasks to the sequence. Only allowed before `run`.
    pub fn add_tasks(
        &mut self,
        tasks: impl IntoIterator<Item = Box<dyn Task<M>>>,
    ) -> ProtocolResult<()> {
        if self.state != RunnerState::Pending {
            return Err(ProtocolError::InvalidState {
                state: format!("{:?}", self.state),
                operation: "add tasks".to_string(),
            });
        }
        self.tasks.extend(tasks);
        Ok(())
    }

    /// Start the first task. A runner without tasks completes immediately.
    pub fn run(&mut self, model: &mut M) -> ProtocolResult<RunnerStatus> {
        if self.state != RunnerState::Pending {
            return Err(ProtocolError::InvalidState {
                state: format!("{:?}", self.state),
                operation: "run".to_string(),
            });
        }
        self.state = RunnerState::Running;
        Ok(self.run_current(model))
    }

    /// Feed a task signal back into the runner. Advances to the next task on completion.
    pub fn handle_event(&mut self, model: &mut M, event: TaskEvent) -> RunnerStatus {
        if event.runner_id != self.id || self.state != RunnerState::Running {
            trace!("Runner #{} ignores stale event from runner #{}", self.id, event.runner_id);
            return RunnerStatus::Ignored;
        }
        if event.index != self.cursor {
            warn!(
                "Runner #{} got a signal from task {} while task {} is in flight",
                self.id, event.index, self.cursor
            );
            return RunnerStatus::Ignored;
        }

        match event.outcome {
            TaskOutcome::Completed => {
                self.cursor += 1;
                self.run_current(model)
            }
            TaskOutcome::Failed(reason) => {
                self.state = RunnerState::Failed;
                RunnerStatus::Failed(ProtocolError::TaskFailed {
                    task: self.tasks[self.cursor].name().to_string(),
                    reason,
                })
            }
        }
    }

    /// Stop the sequence. No further task starts and no further status other than `Ignored` is
    /// reported. Safe to call at any time, any number of times.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if self.state == RunnerState::Pending || self.state == RunnerState::Running {
            debug!("Runner #{} cancelled at task {}", self.id, self.cursor);
            self.state = RunnerState::Cancelled;
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            RunnerState::Completed | RunnerState::Failed | RunnerState::Cancelled
        )
    }

    fn run_current(&mut self, model: &mut M) -> RunnerStatus {
        match self.tasks.get(self.cursor) {
            Some(task) => {
                trace!("Runner #{} runs task {}", self.id, task.name());
                let handle = TaskHandle::new(
                    self.id,
                    self.cursor,
                    task.name(),
                    self.cancelled.clone(),
                    self.event_sender.clone(),
                );
                task.run(model, handle);
                RunnerStatus::Running
            }
            None => {
                self.state = RunnerState::Completed;
                RunnerStatus::Completed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    #[derive(Default)]
    struct Log {
        entries: Vec<&'static str>,
    }

    struct Append(&'static str);

    impl Task<Log> for Append {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, model: &mut Log, handle: TaskHandle) {
            model.entries.push(self.0);
            handle.complete();
        }
    }

    struct Fail;

    impl Task<Log> for Fail {
        fn name(&self) -> &'static str {
            "Fail"
        }

        fn run(&self, _model: &mut Log, handle: TaskHandle) {
            handle.failed("malformed response");
        }
    }

    struct Forget;

    impl Task<Log> for Forget {
        fn name(&self) -> &'static str {
            "Forget"
        }

        fn run(&self, _model: &mut Log, _handle: TaskHandle) {}
    }

    /// Parks its handle for the test to inspect.
    struct Park(std::sync::Arc<std::sync::Mutex<Option<TaskHandle>>>);

    impl Task<Log> for Park {
        fn name(&self) -> &'static str {
            "Park"
        }

        fn run(&self, _model: &mut Log, handle: TaskHandle) {
            *self.0.lock().unwrap() = Some(handle);
        }
    }

    /// Drain queued signals into the runner until it stops making progress.
    fn drive(
        runner: &mut TaskRunner<Log>,
        model: &mut Log,
        receiver: &mut UnboundedReceiver<TaskEvent>,
        mut status: RunnerStatus,
    ) -> RunnerStatus {
        while status == RunnerStatus::Running {
            match receiver.try_recv() {
                Ok(event) => status = runner.handle_event(model, event),
                Err(_) => break,
            }
        }
        status
    }

    #[test]
    fn runs_tasks_in_order() {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        runner
            .add_tasks(vec![
                Box::new(Append("a")) as Box<dyn Task<Log>>,
                Box::new(Append("b")),
                Box::new(Append("c")),
            ])
            .unwrap();

        let status = runner.run(&mut model).unwrap();
        assert_eq!(RunnerStatus::Running, status);
        // only the first task ran, the rest wait for its signal
        assert_eq!(vec!["a"], model.entries);

        let status = drive(&mut runner, &mut model, &mut receiver, status);
        assert_eq!(RunnerStatus::Completed, status);
        assert_eq!(vec!["a", "b", "c"], model.entries);
        assert!(runner.is_finished());
    }

    #[test]
    fn failure_halts_sequence() {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        runner
            .add_tasks(vec![
                Box::new(Append("a")) as Box<dyn Task<Log>>,
                Box::new(Fail),
                Box::new(Append("c")),
            ])
            .unwrap();

        let status = runner.run(&mut model).unwrap();
        let status = drive(&mut runner, &mut model, &mut receiver, status);

        assert_eq!(
            RunnerStatus::Failed(ProtocolError::TaskFailed {
                task: "Fail".into(),
                reason: "malformed response".into()
            }),
            status
        );
        assert_eq!(vec!["a"], model.entries);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn cancel_stops_next_task() {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        runner
            .add_tasks(vec![
                Box::new(Append("a")) as Box<dyn Task<Log>>,
                Box::new(Append("b")),
            ])
            .unwrap();

        runner.run(&mut model).unwrap();
        runner.cancel();
        runner.cancel();

        // the signal of the in flight task arrives after cancellation
        let event = receiver.try_recv().unwrap();
        assert_eq!(RunnerStatus::Ignored, runner.handle_event(&mut model, event));
        assert_eq!(vec!["a"], model.entries);
        assert!(runner.is_finished());
    }

    #[test]
    fn ignores_events_of_other_runners() {
        let (sender, mut receiver) = unbounded_channel();
        let mut old_runner = TaskRunner::new(1, sender.clone());
        let mut new_runner = TaskRunner::new(2, sender);
        let mut model = Log::default();
        old_runner
            .add_tasks(vec![Box::new(Append("old")) as Box<dyn Task<Log>>])
            .unwrap();
        new_runner
            .add_tasks(vec![
                Box::new(Append("new")) as Box<dyn Task<Log>>,
                Box::new(Append("next")),
            ])
            .unwrap();

        old_runner.run(&mut model).unwrap();
        new_runner.run(&mut model).unwrap();

        let old_event = receiver.try_recv().unwrap();
        assert_eq!(1, old_event.runner_id());
        assert_eq!(RunnerStatus::Ignored, new_runner.handle_event(&mut model, old_event));
        assert_eq!(vec!["old", "new"], model.entries);
    }

    #[test]
    fn empty_runner_completes() {
        let (sender, _receiver) = unbounded_channel();
        let mut runner = TaskRunner::<Log>::new(1, sender);
        let mut model = Log::default();
        assert_eq!(RunnerStatus::Completed, runner.run(&mut model).unwrap());
    }

    #[test]
    fn add_tasks_after_run_is_rejected() {
        let (sender, _receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        runner
            .add_tasks(vec![Box::new(Forget) as Box<dyn Task<Log>>])
            .unwrap();
        runner.run(&mut model).unwrap();

        assert!(matches!(
            runner.add_tasks(vec![Box::new(Append("late")) as Box<dyn Task<Log>>]),
            Err(ProtocolError::InvalidState { .. })
        ));
        assert!(matches!(
            runner.run(&mut model),
            Err(ProtocolError::InvalidState { .. })
        ));
    }

    #[test]
    fn dropped_handle_fails_task() {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        runner
            .add_tasks(vec![
                Box::new(Forget) as Box<dyn Task<Log>>,
                Box::new(Append("b")),
            ])
            .unwrap();

        let status = runner.run(&mut model).unwrap();
        let status = drive(&mut runner, &mut model, &mut receiver, status);

        assert!(matches!(status, RunnerStatus::Failed(ProtocolError::TaskFailed { .. })));
        assert!(model.entries.is_empty());
    }

    #[test]
    fn parked_handle_sees_cancellation() {
        let (sender, mut receiver) = unbounded_channel();
        let mut runner = TaskRunner::new(1, sender);
        let mut model = Log::default();
        let slot = std::sync::Arc::new(std::sync::Mutex::new(None));
        runner
            .add_tasks(vec![Box::new(Park(slot.clone())) as Box<dyn Task<Log>>])
            .unwrap();
        runner.run(&mut model).unwrap();

        let handle = slot.lock().unwrap().take().unwrap();
        assert!(!handle.is_cancelled());
        runner.cancel();
        assert!(handle.is_cancelled());

        handle.complete();
        let event = receiver.try_recv().unwrap();
        assert_eq!(RunnerStatus::Ignored, runner.handle_event(&mut model, event));
    }
}
