use crate::err::{ProtocolError, ProtocolResult};
use futures::Future;
use tokio::task::JoinHandle;

/// Represents a way to stop a concurrent process and to wait for it to stop. Returned by functions that spawn long running services such as the availability responder.
pub trait Stopper {
    /// Send a stop signal to the process and then wait for it to terminate
    fn stop(self) -> impl Future<Output = ProtocolResult<()>> + Send;
    /// Wait for the process to terminate without sending a stop signal
    fn join(self) -> impl Future<Output = ProtocolResult<()>> + Send;
}

pub struct BasicStopper {
    stop_sender: tokio::sync::oneshot::Sender<()>,
    join_handle: JoinHandle<ProtocolResult<()>>,
}

impl BasicStopper {
    pub(crate) fn new(
        stop_sender: tokio::sync::oneshot::Sender<()>,
        join_handle: JoinHandle<ProtocolResult<()>>,
    ) -> Self {
        Self {
            stop_sender,
            join_handle,
        }
    }
}

impl Stopper for BasicStopper {
    async fn stop(self) -> ProtocolResult<()> {
        self.stop_sender
            .send(())
            .map_err(|_| ProtocolError::ChannelClosed)?;
        self.join_handle.await??;
        Ok(())
    }

    async fn join(self) -> ProtocolResult<()> {
        self.join_handle.await??;
        Ok(())
    }
}
