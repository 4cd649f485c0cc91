use sourcebox_shared::error::{CryptoError, QueueError};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sealing or opening a stored blob failed, usually a wrong storage key.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Stored sending queue is invalid: {0}")]
    Queue(#[from] QueueError),

    /// Blob names are flat file names: ASCII letters, digits, `-`, `_`, `.`.
    #[error("Invalid blob name: {0:?}")]
    InvalidBlobName(String),

    #[error("Blob store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
