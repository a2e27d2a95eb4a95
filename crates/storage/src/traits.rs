//! Blob store contract.

use crate::context::OpContext;
use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use stash_core::{BlobId, StorageConfig};
use std::future::Future;
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed stream of listing results, borrowing the store.
pub type BlobStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<BlobMetadata>> + Send + 'a>>;

/// One listed blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Logical id, independent of physical placement.
    pub id: BlobId,
    /// Size in bytes.
    pub length: u64,
    /// Last modification time (if the backend reports one).
    pub timestamp: Option<OffsetDateTime>,
}

/// Key-addressed blob storage.
///
/// Every operation takes an [`OpContext`] and fails with a `Cancelled` error
/// if it is cancelled or its deadline passes. Failures are never retried
/// internally; the error kind tells the caller whether a retry makes sense.
///
/// Implementations must be safe for concurrent use on different ids.
/// Concurrent writes and deletes of the same id are unordered.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `data` under `id`, replacing any previous content.
    ///
    /// Hierarchical backends create missing shard directories on the way.
    async fn put_blob(&self, cx: &OpContext, id: &BlobId, data: Bytes) -> StorageResult<()>;

    /// Fetch a blob's content. Fails with `NotFound` if it does not exist.
    async fn get_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<Bytes>;

    /// Fetch `length` bytes starting at `offset`.
    ///
    /// Requests reaching past the end of the blob fail with `InvalidRange`.
    async fn get_blob_range(
        &self,
        cx: &OpContext,
        id: &BlobId,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes>;

    /// Fetch a blob as a stream of chunks.
    ///
    /// The stream stays bound to `cx`: cancelling it ends the stream with a
    /// `Cancelled` error.
    async fn get_blob_stream(&self, cx: &OpContext, id: &BlobId) -> StorageResult<ByteStream>;

    /// Remove a blob. Deleting a missing blob succeeds.
    async fn delete_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<()>;

    /// Lazily list all blobs whose logical id starts with `prefix`.
    ///
    /// Each call starts a fresh listing. Order is unspecified; each id is
    /// reported once.
    fn list_blobs<'a>(&'a self, cx: &OpContext, prefix: &str) -> BlobStream<'a>;

    /// Configuration that reconnects to this exact backend.
    fn connection_info(&self) -> StorageConfig;

    /// Release backend resources. Every later call fails with `Closed`.
    async fn close(&self, cx: &OpContext) -> StorageResult<()>;

    /// Static backend identifier used in logs (e.g., "webdav", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and properly configured.
    ///
    /// The default implementation only checks the context.
    async fn health_check(&self, cx: &OpContext) -> StorageResult<()> {
        cx.check()
    }
}

/// Convenience helpers available on every [`BlobStore`].
pub trait BlobStoreExt: BlobStore {
    /// Collect a full listing into memory.
    fn list_all<'a>(
        &'a self,
        cx: &OpContext,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = StorageResult<Vec<BlobMetadata>>> + Send + 'a>> {
        let stream = self.list_blobs(cx, prefix);
        Box::pin(stream.try_collect())
    }
}

impl<T: BlobStore + ?Sized> BlobStoreExt for T {}
