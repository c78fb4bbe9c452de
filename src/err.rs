use thiserror::Error;

#[derive(Error, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum ProtocolError {
    #[error("An error occurred at task {task}: {reason}")]
    TaskFailed { task: String, reason: String },
    #[error("Timeout reached: Peer has not responded.")]
    Timeout,

    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState { state: String, operation: String },
    #[error("Timeout already armed")]
    TimerAlreadyArmed,

    #[error("Invalid correlation id: {0:?}")]
    InvalidId(String),
    #[error("Peer address unknown for offer {0}")]
    PeerAddressUnknown(String),
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Channel closed by peer")]
    ChannelClosed,

    #[error("Deserialize message failed: {0}")]
    MalformedMessage(String),
    #[error("Serialize message failed: {0}")]
    UnserializableMessage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IOError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl<T> From<ciborium::ser::Error<T>> for ProtocolError
where
    T: std::fmt::Debug,
{
    fn from(error: ciborium::ser::Error<T>) -> Self {
        ProtocolError::UnserializableMessage(format!("{:?}", error))
    }
}

impl<T> From<ciborium::de::Error<T>> for ProtocolError
where
    T: std::fmt::Debug,
{
    fn from(error: ciborium::de::Error<T>) -> Self {
        ProtocolError::MalformedMessage(format!("{:?}", error))
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(error: std::io::Error) -> Self {
        ProtocolError::IOError(error.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ProtocolError {
    fn from(_error: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ProtocolError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for ProtocolError {
    fn from(error: tokio::task::JoinError) -> Self {
        ProtocolError::InternalError(error.to_string())
    }
}

impl From<serde_json::error::Error> for ProtocolError {
    fn from(error: serde_json::error::Error) -> Self {
        ProtocolError::UnserializableMessage(error.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ProtocolError {
    fn from(error: tokio::sync::oneshot::error::RecvError) -> Self {
        ProtocolError::InternalError(error.to_string())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
