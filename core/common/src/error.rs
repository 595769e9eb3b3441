//! Common error types for driftsync.

use thiserror::Error;

/// Top-level error type for sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// `initialize` was called twice, or registration was attempted after it.
    #[error("Sync coordinator is already initialized")]
    AlreadyInitialized,

    /// A sync was requested before `initialize`.
    #[error("Sync coordinator is not initialized")]
    NotInitialized,

    /// No default registration exists for the requested entity kind.
    #[error("Entity kind not registered: {0}")]
    NotRegistered(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A remote page fetch failed.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A remote page fetch did not complete in time.
    #[error("Fetch timed out: {0}")]
    Timeout(String),

    /// Local store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A persisted watermark could not be parsed.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Timeout(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
