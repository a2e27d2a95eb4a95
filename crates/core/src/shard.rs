//! Directory sharding of flat blob ids onto nested paths.
//!
//! A [`ShardSpec`] lists how many leading characters of an id form each
//! directory level. With `[3, 3]`, id `abcdef0123` lands at `abc/def/0123`.
//! The mapping is a pure function of the id and the shard spec and is reversible
//! by concatenating the segments back together.

use crate::id::{BlobId, MAX_ID_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered prefix widths, one per directory level. Empty means flat.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct ShardSpec(Vec<usize>);

impl ShardSpec {
    /// Build a shard spec, rejecting zero-width levels and specs that would
    /// consume every character of the longest valid id.
    pub fn new(widths: Vec<usize>) -> crate::Result<Self> {
        if let Some(pos) = widths.iter().position(|w| *w == 0) {
            return Err(crate::Error::InvalidShardSpec(format!(
                "level {pos} has zero width in {widths:?}"
            )));
        }
        let total = widths
            .iter()
            .try_fold(0usize, |acc, w| acc.checked_add(*w))
            .filter(|total| *total < MAX_ID_LEN);
        if total.is_none() {
            return Err(crate::Error::InvalidShardSpec(format!(
                "widths {widths:?} must sum to less than {MAX_ID_LEN}"
            )));
        }
        Ok(Self(widths))
    }

    /// Store blobs without intermediate directories.
    pub fn flat() -> Self {
        Self(Vec::new())
    }

    pub fn widths(&self) -> &[usize] {
        &self.0
    }

    /// Number of directory levels.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_flat(&self) -> bool {
        self.0.is_empty()
    }

    /// Characters consumed by all directory levels together.
    pub fn total_width(&self) -> usize {
        self.0.iter().sum()
    }

    /// Split `id` into directory segments and a final name.
    ///
    /// Fails when the id is shorter than [`total_width`](Self::total_width);
    /// that is a configuration problem with the shard spec, not with the blob.
    pub fn shard(&self, id: &BlobId) -> crate::Result<ShardedPath> {
        let s = id.as_str();
        let total = self.total_width();
        if s.len() < total {
            return Err(crate::Error::InvalidShardSpec(format!(
                "shard spec {self} consumes {total} characters but blob id {id} has only {}",
                s.len()
            )));
        }

        let mut dirs = Vec::with_capacity(self.0.len());
        let mut rest = s;
        for width in &self.0 {
            let (segment, tail) = rest.split_at(*width);
            dirs.push(segment.to_string());
            rest = tail;
        }

        Ok(ShardedPath {
            dirs,
            name: rest.to_string(),
        })
    }

    /// Recover a logical id from a `/`-separated relative path.
    ///
    /// The path must have exactly one segment per level with the configured
    /// widths; anything else was not placed by this shard spec.
    pub fn unshard_path(&self, path: &str) -> crate::Result<BlobId> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != self.depth() + 1 {
            return Err(crate::Error::InvalidShardSpec(format!(
                "path {path:?} has {} segments, spec {self} expects {}",
                segments.len(),
                self.depth() + 1
            )));
        }
        for (segment, width) in segments.iter().zip(&self.0) {
            if segment.len() != *width {
                return Err(crate::Error::InvalidShardSpec(format!(
                    "segment {segment:?} of {path:?} does not match width {width}"
                )));
            }
        }
        BlobId::new(segments.concat())
    }
}

impl TryFrom<Vec<usize>> for ShardSpec {
    type Error = crate::Error;

    fn try_from(value: Vec<usize>) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ShardSpec> for Vec<usize> {
    fn from(spec: ShardSpec) -> Self {
        spec.0
    }
}

impl fmt::Debug for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardSpec({:?})", self.0)
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Physical placement of one blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardedPath {
    /// Directory segments, outermost first.
    pub dirs: Vec<String>,
    /// Remainder of the id after all directory levels.
    pub name: String,
}

impl ShardedPath {
    /// Join segments and name with `/`.
    pub fn relative_path(&self) -> String {
        let mut out = String::new();
        for dir in &self.dirs {
            out.push_str(dir);
            out.push('/');
        }
        out.push_str(&self.name);
        out
    }

    /// Concatenate the pieces back into the logical id.
    pub fn unshard(&self) -> crate::Result<BlobId> {
        let mut id = self.dirs.concat();
        id.push_str(&self.name);
        BlobId::new(id)
    }
}

/// Whether a directory whose segments concatenate to `dir_prefix` can hold
/// ids starting with `prefix`.
///
/// Used by listings to skip subtrees that cannot match.
pub fn may_contain(dir_prefix: &str, prefix: &str) -> bool {
    dir_prefix.starts_with(prefix) || prefix.starts_with(dir_prefix)
}
