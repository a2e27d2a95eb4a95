//! Storage error types.

use stash_core::ErrorKind;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {context}")]
    UnexpectedStatus { status: u16, context: String },

    #[error("malformed backend response: {0}")]
    Protocol(String),

    #[error("access denied: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] stash_core::Error),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Http(_) | Self::UnexpectedStatus { .. } | Self::Protocol(_) => {
                ErrorKind::Connectivity
            }
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Core(e) => e.kind(),
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::InvalidRange(_) | Self::Closed => ErrorKind::Precondition,
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
