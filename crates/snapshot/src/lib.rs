//! Snapshot directory trees stored as blobs.
//!
//! A snapshot is a tree of [`Entry`] values. Each directory's children are
//! serialized as a [`Listing`] blob named by the directory entry's object id;
//! [`SnapshotReader`] resolves those blobs back into [`Directory`] values on
//! demand, so a large tree is never materialized at once.

pub mod directory;
pub mod error;
pub mod listing;
pub mod reader;

pub use directory::Directory;
pub use error::{SnapshotError, SnapshotResult};
pub use listing::Listing;
pub use reader::{BoundEntry, ContentReader, SnapshotReader};
pub use stash_core::{Entry, EntryType, ObjectId};
