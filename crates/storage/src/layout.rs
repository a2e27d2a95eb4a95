//! Physical placement of blobs on hierarchical backends.

use crate::error::{StorageError, StorageResult};
use stash_core::id::is_id_fragment;
use stash_core::shard::may_contain;
use stash_core::{BlobId, ShardSpec, ShardedPath};

/// Maps blob ids to shard directories and back.
///
/// Shared by every hierarchical backend so that listing reverses exactly
/// what writing produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardedLayout {
    shards: ShardSpec,
}

impl ShardedLayout {
    pub fn new(shards: ShardSpec) -> Self {
        Self { shards }
    }

    pub fn shards(&self) -> &ShardSpec {
        &self.shards
    }

    pub fn depth(&self) -> usize {
        self.shards.depth()
    }

    /// Compute where `id` lives.
    ///
    /// Ids fully consumed by the directory levels would have no file name;
    /// both that and ids shorter than the shard spec are configuration errors, as
    /// are ids whose segments would read as `.` or `..`.
    pub fn place(&self, id: &BlobId) -> StorageResult<ShardedPath> {
        let path = self.shards.shard(id)?;
        if path.name.is_empty() {
            return Err(StorageError::Config(format!(
                "shard spec {} leaves no file name for blob id {id}",
                self.shards
            )));
        }
        if let Some(seg) = path
            .dirs
            .iter()
            .chain(std::iter::once(&path.name))
            .find(|seg| *seg == "." || *seg == "..")
        {
            return Err(StorageError::Config(format!(
                "blob id {id} produces reserved path segment '{seg}'"
            )));
        }
        Ok(path)
    }

    /// Whether a directory entry named `name` at `level` belongs to the
    /// layout and may hold ids starting with `prefix`.
    ///
    /// `parent` is the concatenation of the segments above it.
    pub fn descend(&self, level: usize, parent: &str, name: &str, prefix: &str) -> bool {
        let Some(width) = self.shards.widths().get(level) else {
            return false;
        };
        if name.len() != *width || !is_id_fragment(name) {
            return false;
        }
        let mut dir_prefix = String::with_capacity(parent.len() + name.len());
        dir_prefix.push_str(parent);
        dir_prefix.push_str(name);
        may_contain(&dir_prefix, prefix)
    }

    /// Recover the id of a file found at the leaf level.
    ///
    /// Returns `None` for foreign files (temp files, wrong depth) and for ids
    /// outside `prefix`.
    pub fn leaf_id(&self, level: usize, parent: &str, name: &str, prefix: &str) -> Option<BlobId> {
        if level != self.depth() || !is_id_fragment(name) {
            return None;
        }
        let mut id = String::with_capacity(parent.len() + name.len());
        id.push_str(parent);
        id.push_str(name);
        if !id.starts_with(prefix) {
            return None;
        }
        BlobId::new(id).ok()
    }
}
