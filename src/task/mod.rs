//! Tasks are the steps of a protocol phase. A [`TaskRunner`] runs them one at a time, in order,
//! against the model of a single protocol run.
//!
//! A task receives the model by unique borrow and a [`TaskHandle`]. It must eventually call exactly
//! one of [`TaskHandle::complete`] or [`TaskHandle::failed`]. It may do so before returning from
//! `run`, or later from a spawned future that owns the handle. Either way the signal is queued as a
//! [`TaskEvent`] and the runner only advances when its owner feeds the event back in.

mod runner;

pub use runner::{RunnerStatus, TaskRunner};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedSender;

pub type RunnerId = u64;

/// One step of a protocol phase.
pub trait Task<M>: Send {
    fn name(&self) -> &'static str;

    fn run(&self, model: &mut M, handle: TaskHandle);
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) enum TaskOutcome {
    Completed,
    Failed(String),
}

/// Signal from a task to the runner that started it.
#[derive(Debug)]
pub struct TaskEvent {
    pub(crate) runner_id: RunnerId,
    pub(crate) index: usize,
    pub(crate) outcome: TaskOutcome,
}

impl TaskEvent {
    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }
}

/// Single-use completion handle given to a running task.
///
/// Dropping the handle without signalling counts as a failure, so a task can never stall its
/// runner by forgetting to report.
pub struct TaskHandle {
    runner_id: RunnerId,
    index: usize,
    task: &'static str,
    cancelled: Arc<AtomicBool>,
    sender: Option<UnboundedSender<TaskEvent>>,
}

impl TaskHandle {
    pub(crate) fn new(
        runner_id: RunnerId,
        index: usize,
        task: &'static str,
        cancelled: Arc<AtomicBool>,
        sender: UnboundedSender<TaskEvent>,
    ) -> Self {
        TaskHandle {
            runner_id,
            index,
            task,
            cancelled,
            sender: Some(sender),
        }
    }

    pub fn complete(mut self) {
        trace!("Task {} completed", self.task);
        self.signal(TaskOutcome::Completed);
    }

    pub fn failed(mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!("Task {} failed: {}", self.task, &reason);
        self.signal(TaskOutcome::Failed(reason));
    }

    /// True once the runner that started this task has been cancelled. Long running tasks can
    /// use it to stop early; their signal is ignored either way.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn signal(&mut self, outcome: TaskOutcome) {
        if let Some(sender) = self.sender.take() {
            // the runner's owner may already be gone, nobody is waiting then
            let _ = sender.send(TaskEvent {
                runner_id: self.runner_id,
                index: self.index,
                outcome,
            });
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if self.sender.is_some() {
            warn!("Task {} finished without reporting a result", self.task);
            self.signal(TaskOutcome::Failed(format!(
                "Task {} finished without reporting a result",
                self.task
            )));
        }
    }
}
