//! Error types for the core domain.

use thiserror::Error;

/// Coarse classification shared by every error type in the workspace.
///
/// Callers branch on the kind to decide retry policy; the concrete error
/// carries the details.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The blob or listing does not exist.
    NotFound,
    /// Data failed integrity verification.
    Corruption,
    /// Transient network or disk failure. Retryable by the caller.
    Connectivity,
    /// Credentials were rejected by the backend.
    Unauthorized,
    /// Invalid shard spec, connection info or identifier.
    Configuration,
    /// The caller cancelled the operation or its deadline passed.
    Cancelled,
    /// The operation is not valid in the current state.
    Precondition,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Corruption => "corruption",
            Self::Connectivity => "connectivity",
            Self::Unauthorized => "unauthorized",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
            Self::Precondition => "precondition",
        };
        f.write_str(s)
    }
}

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid blob id {id:?}: {reason}")]
    InvalidBlobId { id: String, reason: String },

    #[error("invalid object id {id:?}: {reason}")]
    InvalidObjectId { id: String, reason: String },

    #[error("invalid shard spec: {0}")]
    InvalidShardSpec(String),

    #[error("invalid entry type code: {0:?}")]
    InvalidEntryType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEntryType(_) | Self::Serialization(_) => ErrorKind::Corruption,
            _ => ErrorKind::Configuration,
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
