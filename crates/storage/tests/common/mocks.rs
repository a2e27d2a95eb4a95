use async_trait::async_trait;
use bytes::Bytes;
use stash_core::{BlobId, ShardSpec, StorageConfig};
use stash_storage::context::OpContext;
use stash_storage::error::{StorageError, StorageResult};
use stash_storage::traits::{BlobMetadata, BlobStore, BlobStream, ByteStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Instrumented backend that lists synthetic blobs on demand and counts how
/// many it produced.
/// Useful for testing cancellation and backpressure behavior
#[allow(dead_code)]
pub struct InstrumentedBackend {
    pub total_blobs: usize,
    pub produced: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub fn new(total_blobs: usize) -> (Arc<Self>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Self {
            total_blobs,
            produced: counter.clone(),
        });
        (backend, counter)
    }

    fn id(i: usize) -> StorageResult<BlobId> {
        Ok(BlobId::new(format!("{i:016x}"))?)
    }
}

#[async_trait]
impl BlobStore for InstrumentedBackend {
    async fn put_blob(&self, _cx: &OpContext, _id: &BlobId, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Config("instrumented backend is read-only".to_string()))
    }

    async fn get_blob(&self, _cx: &OpContext, id: &BlobId) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn get_blob_range(
        &self,
        _cx: &OpContext,
        id: &BlobId,
        _offset: u64,
        _length: u64,
    ) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn get_blob_stream(&self, _cx: &OpContext, id: &BlobId) -> StorageResult<ByteStream> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn delete_blob(&self, _cx: &OpContext, _id: &BlobId) -> StorageResult<()> {
        Ok(())
    }

    fn list_blobs<'a>(&'a self, cx: &OpContext, prefix: &str) -> BlobStream<'a> {
        let prefix = prefix.to_string();
        let stream: BlobStream<'a> = Box::pin(async_stream::try_stream! {
            for i in 0..self.total_blobs {
                // Yield to the runtime so consumers can drop the stream mid-listing.
                tokio::task::yield_now().await;
                let id = Self::id(i)?;
                if !id.has_prefix(&prefix) {
                    continue;
                }
                self.produced.fetch_add(1, Ordering::SeqCst);
                yield BlobMetadata { id, length: 0, timestamp: None };
            }
        });
        cx.guard_stream(stream)
    }

    fn connection_info(&self) -> StorageConfig {
        StorageConfig::Filesystem {
            path: "/nonexistent".into(),
            shards: ShardSpec::flat(),
        }
    }

    async fn close(&self, _cx: &OpContext) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
