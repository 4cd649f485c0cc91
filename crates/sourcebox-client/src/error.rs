use sourcebox_shared::error::{KeyError, ProtocolError, QueueError};
use sourcebox_shared::SourceboxError;
use sourcebox_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] SourceboxError),

    #[error("Invalid trusted root on line {line}: {source}")]
    InvalidTrustedRoot { line: usize, source: KeyError },

    #[error("No trusted roots configured")]
    NoTrustedRoots,

    /// Sending and receiving need a verified key hierarchy first.
    #[error("Public keys have not been loaded")]
    PublicKeysNotLoaded,

    /// The queue front is no longer the message that was handed out for
    /// sending.
    #[error("Sent message is no longer at the front of the queue")]
    SentMessageNotAtFront,

    #[error("Unknown journalist: {0}")]
    UnknownJournalist(String),

    #[error("Sending queue lock poisoned")]
    LockPoisoned,
}

impl From<KeyError> for ClientError {
    fn from(e: KeyError) -> Self {
        Self::Core(e.into())
    }
}

impl From<QueueError> for ClientError {
    fn from(e: QueueError) -> Self {
        Self::Core(e.into())
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
