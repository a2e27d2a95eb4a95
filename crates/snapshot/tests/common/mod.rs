#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use stash_core::{BlobId, Entry, EntryType, ObjectId, ShardSpec, StorageConfig};
use stash_snapshot::Listing;
use stash_storage::backends::filesystem::FilesystemBackend;
use stash_storage::error::{StorageError, StorageResult};
use stash_storage::traits::{BlobStore, BlobStream, ByteStream};
use stash_storage::OpContext;
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;

pub const README: &[u8] = b"# docs\n";
pub const PNG: &[u8] = b"\x89PNG fake image";
pub const NOTES: &[u8] = b"remember the milk";

pub fn oid(s: &str) -> ObjectId {
    ObjectId::new(s).unwrap()
}

pub fn entry(name: &str, entry_type: EntryType, object_id: &str, size: u64) -> Entry {
    Entry {
        name: name.to_string(),
        size,
        entry_type,
        mod_time: datetime!(2024-05-06 07:08:09 UTC),
        mode: 0o644,
        user_id: 1000,
        group_id: 100,
        object_id: oid(object_id),
        metadata_crc32: 0,
    }
    .sealed()
}

/// A small snapshot stored on a filesystem backend:
///
/// ```text
/// docs/
///   readme.txt
///   img/
///     a.png
/// notes.txt
/// ```
pub struct SampleTree {
    pub store: Arc<dyn BlobStore>,
    pub root: ObjectId,
    _dir: TempDir,
}

impl SampleTree {
    pub async fn build() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(dir.path(), ShardSpec::new(vec![2]).unwrap())
                .await
                .unwrap(),
        );
        let cx = OpContext::background();

        for (id, data) in [("file-readme", README), ("file-png", PNG), ("file-notes", NOTES)] {
            store
                .put_blob(&cx, &BlobId::new(id).unwrap(), Bytes::from_static(data))
                .await
                .unwrap();
        }

        Listing::new(vec![entry("a.png", EntryType::File, "file-png", PNG.len() as u64)])
            .store(&cx, store.as_ref(), &oid("dir-img"))
            .await
            .unwrap();
        Listing::new(vec![
            entry("readme.txt", EntryType::File, "file-readme", README.len() as u64),
            entry("img", EntryType::Directory, "dir-img", 0),
        ])
        .store(&cx, store.as_ref(), &oid("dir-docs"))
        .await
        .unwrap();
        Listing::new(vec![
            entry("docs", EntryType::Directory, "dir-docs", 0),
            entry("notes.txt", EntryType::File, "file-notes", NOTES.len() as u64),
        ])
        .store(&cx, store.as_ref(), &oid("dir-root"))
        .await
        .unwrap();

        Self {
            store,
            root: oid("dir-root"),
            _dir: dir,
        }
    }
}

/// Delegates to an inner store but fails reads of one blob with a
/// connectivity error.
pub struct FailingBackend {
    pub inner: Arc<dyn BlobStore>,
    pub failing: BlobId,
}

impl FailingBackend {
    fn check(&self, id: &BlobId) -> StorageResult<()> {
        if *id == self.failing {
            return Err(StorageError::UnexpectedStatus {
                status: 503,
                context: format!("GET {id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FailingBackend {
    async fn put_blob(&self, cx: &OpContext, id: &BlobId, data: Bytes) -> StorageResult<()> {
        self.inner.put_blob(cx, id, data).await
    }

    async fn get_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<Bytes> {
        self.check(id)?;
        self.inner.get_blob(cx, id).await
    }

    async fn get_blob_range(
        &self,
        cx: &OpContext,
        id: &BlobId,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        self.check(id)?;
        self.inner.get_blob_range(cx, id, offset, length).await
    }

    async fn get_blob_stream(&self, cx: &OpContext, id: &BlobId) -> StorageResult<ByteStream> {
        self.check(id)?;
        self.inner.get_blob_stream(cx, id).await
    }

    async fn delete_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<()> {
        self.inner.delete_blob(cx, id).await
    }

    fn list_blobs<'a>(&'a self, cx: &OpContext, prefix: &str) -> BlobStream<'a> {
        self.inner.list_blobs(cx, prefix)
    }

    fn connection_info(&self) -> StorageConfig {
        self.inner.connection_info()
    }

    async fn close(&self, cx: &OpContext) -> StorageResult<()> {
        self.inner.close(cx).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
