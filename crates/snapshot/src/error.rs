//! Snapshot resolution errors.

use stash_core::{ErrorKind, ObjectId};
use stash_storage::StorageError;
use thiserror::Error;

/// Errors raised while reading or writing snapshot trees.
///
/// Every variant about a stored object names its [`ObjectId`], so a failed
/// traversal reports which subtree broke.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("listing {oid} is corrupt: {reason}")]
    Corruption { oid: ObjectId, reason: String },

    #[error("object not found: {oid}")]
    NotFound { oid: ObjectId },

    #[error("no entry named '{name}' in directory {oid}")]
    NoSuchEntry { oid: ObjectId, name: String },

    #[error("storage error for {oid}: {source}")]
    Storage {
        oid: ObjectId,
        #[source]
        source: StorageError,
    },

    #[error("'{name}' is not a directory")]
    NotADirectory { name: String },

    #[error("'{name}' is not a regular file")]
    NotAFile { name: String },

    #[error("invalid snapshot path: {0}")]
    InvalidPath(String),

    #[error("failed to encode listing: {0}")]
    Encode(String),
}

impl SnapshotError {
    /// Wrap a storage failure for `oid`, folding missing blobs into `NotFound`.
    pub fn from_storage(oid: &ObjectId, source: StorageError) -> Self {
        if source.is_not_found() {
            Self::NotFound { oid: oid.clone() }
        } else {
            Self::Storage {
                oid: oid.clone(),
                source,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Corruption { .. } | Self::Encode(_) => ErrorKind::Corruption,
            Self::NotFound { .. } | Self::NoSuchEntry { .. } => ErrorKind::NotFound,
            Self::Storage { source, .. } => source.kind(),
            Self::NotADirectory { .. } | Self::NotAFile { .. } | Self::InvalidPath(_) => {
                ErrorKind::Precondition
            }
        }
    }

    /// The object this error concerns, if any.
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Corruption { oid, .. }
            | Self::NotFound { oid }
            | Self::NoSuchEntry { oid, .. }
            | Self::Storage { oid, .. } => Some(oid),
            _ => None,
        }
    }
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;
