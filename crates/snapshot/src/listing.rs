//! Serialized form of one directory's children.

use crate::error::{SnapshotError, SnapshotResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stash_core::{Entry, ObjectId};
use stash_storage::{BlobStore, OpContext};

/// Children of one directory, in traversal order.
///
/// Encoded as JSON and stored as the blob named by the directory entry's
/// object id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub entries: Vec<Entry>,
}

impl Listing {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Append `entry` with its checksum filled in.
    pub fn push_sealed(&mut self, entry: Entry) {
        self.entries.push(entry.sealed());
    }

    pub fn encode(&self) -> SnapshotResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode the listing blob of `oid`.
    pub fn decode(oid: &ObjectId, data: &[u8]) -> SnapshotResult<Self> {
        serde_json::from_slice(data).map_err(|e| SnapshotError::Corruption {
            oid: oid.clone(),
            reason: format!("malformed listing: {e}"),
        })
    }

    /// Persist this listing as the blob for `oid`.
    #[tracing::instrument(skip(self, cx, store), fields(entries = self.entries.len()))]
    pub async fn store(
        &self,
        cx: &OpContext,
        store: &dyn BlobStore,
        oid: &ObjectId,
    ) -> SnapshotResult<()> {
        let data = self.encode()?;
        store
            .put_blob(cx, oid.blob_id(), data)
            .await
            .map_err(|e| SnapshotError::from_storage(oid, e))
    }
}
