//! Core domain types for the stash storage tier.
//!
//! This crate defines the data model shared by the storage backends and the
//! snapshot tree:
//! - Blob and object identifiers
//! - Directory sharding of blob ids
//! - Backend connection info and repository configuration
//! - Snapshot entry metadata and its checksum
//! - The error kinds every layer reports

pub mod config;
pub mod entry;
pub mod error;
pub mod id;
pub mod shard;

pub use config::{RepositoryConfig, StorageConfig};
pub use entry::{Entry, EntryType};
pub use error::{Error, ErrorKind, Result};
pub use id::{BlobId, ObjectId};
pub use shard::{ShardSpec, ShardedPath};
