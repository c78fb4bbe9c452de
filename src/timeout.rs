use crate::err::{ProtocolError, ProtocolResult};
use std::{pin::Pin, time::Duration};
use tokio::time::{Instant, Sleep};

/// A single-shot deadline for the step a protocol run is currently waiting on.
///
/// At most one timer is live at a time. Await [`TimeoutGuard::expired`] in the owner's event loop;
/// it resolves once when the deadline passes and the guard clears itself.
pub struct TimeoutGuard {
    duration: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimeoutGuard {
    pub fn new(duration: Duration) -> TimeoutGuard {
        TimeoutGuard {
            duration,
            sleep: None,
        }
    }

    /// Arm the timer. Fails if it is already armed, the running deadline is kept.
    pub fn start(&mut self) -> ProtocolResult<()> {
        if self.sleep.is_some() {
            warn!("Timeout already armed. That must not happen.");
            return Err(ProtocolError::TimerAlreadyArmed);
        }
        self.sleep = Some(Box::pin(tokio::time::sleep(self.duration)));
        Ok(())
    }

    pub fn stop(&mut self) {
        self.sleep = None;
    }

    /// Stop and arm again with a fresh deadline.
    pub fn restart(&mut self) {
        self.stop();
        self.sleep = Some(Box::pin(tokio::time::sleep(self.duration)));
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolves when the armed deadline passes, then disarms. Never resolves while disarmed.
    ///
    /// Cancel safe: dropping the future leaves the timer armed.
    pub async fn expired(&mut self) {
        let Some(sleep) = self.sleep.as_mut() else {
            return futures::future::pending::<()>().await;
        };
        sleep.as_mut().await;
        self.sleep = None;
    }
}
