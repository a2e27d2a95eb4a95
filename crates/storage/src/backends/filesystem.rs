//! Local filesystem storage backend.

use crate::context::OpContext;
use crate::error::{StorageError, StorageResult};
use crate::layout::ShardedLayout;
use crate::traits::{BlobMetadata, BlobStore, BlobStream, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use stash_core::{BlobId, ShardSpec, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum range size for get_blob_range operations (128 MiB).
const MAX_RANGE_SIZE: u64 = 128 * 1024 * 1024;

/// Marker separating a blob name from a temp-file suffix. Not part of the
/// blob id alphabet, so listings never mistake temp files for blobs.
const TEMP_MARKER: &str = ".tmp~";

/// Sharded blob store rooted at a local directory.
pub struct FilesystemBackend {
    root: PathBuf,
    layout: ShardedLayout,
    closed: AtomicBool,
}

impl std::fmt::Debug for FilesystemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemBackend")
            .field("root", &self.root)
            .field("shards", self.layout.shards())
            .finish_non_exhaustive()
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>, shards: ShardSpec) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            layout: ShardedLayout::new(shards),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Full path of the file holding `id`.
    fn blob_path(&self, id: &BlobId) -> StorageResult<PathBuf> {
        let placed = self.layout.place(id)?;
        let mut path = self.root.clone();
        for dir in &placed.dirs {
            path.push(dir);
        }
        path.push(&placed.name);
        Ok(path)
    }
}

fn map_read_error(e: std::io::Error, id: &BlobId) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(id.to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Removes a temp file when dropped unless it was renamed into place.
///
/// Covers both failed writes and writes abandoned by a cancelled caller.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    /// Create the file synchronously so it exists before the guard does.
    fn create(path: PathBuf) -> std::io::Result<(Self, fs::File)> {
        let file = std::fs::File::create(&path)?;
        Ok((Self { path, armed: true }, fs::File::from_std(file)))
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp file");
        }
    }
}

/// Write to a uniquely named temp file, fsync, then rename into place.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!("{file_name}{TEMP_MARKER}{}", Uuid::new_v4()));

    let (mut guard, mut file) = TempFile::create(temp_path)?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&guard.path, path).await?;
    guard.disarm();
    Ok(())
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self, cx, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_blob(&self, cx: &OpContext, id: &BlobId, data: Bytes) -> StorageResult<()> {
        self.ensure_open()?;
        let path = self.blob_path(id)?;

        cx.run(async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            match write_atomic(&path, &data).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Shard directory vanished between creation and write.
                    tracing::debug!(path = %path.display(), "recreating shard directory");
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    write_atomic(&path, &data).await?;
                }
                other => other?,
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "filesystem"))]
    async fn get_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<Bytes> {
        self.ensure_open()?;
        let path = self.blob_path(id)?;
        cx.run(async {
            let data = fs::read(&path).await.map_err(|e| map_read_error(e, id))?;
            Ok(Bytes::from(data))
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "filesystem"))]
    async fn get_blob_range(
        &self,
        cx: &OpContext,
        id: &BlobId,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        self.ensure_open()?;
        if length == 0 {
            return Ok(Bytes::new());
        }
        if length > MAX_RANGE_SIZE {
            return Err(StorageError::InvalidRange(format!(
                "range size {length} exceeds maximum {MAX_RANGE_SIZE} bytes"
            )));
        }
        let len = usize::try_from(length).map_err(|_| {
            StorageError::InvalidRange(format!(
                "range size {length} exceeds platform address space"
            ))
        })?;
        let path = self.blob_path(id)?;

        cx.run(async {
            let mut file = fs::File::open(&path)
                .await
                .map_err(|e| map_read_error(e, id))?;
            let size = file.metadata().await?.len();
            let end = offset.checked_add(length).ok_or_else(|| {
                StorageError::InvalidRange(format!("offset {offset} + length {length} overflows"))
            })?;
            if end > size {
                return Err(StorageError::InvalidRange(format!(
                    "range {offset}..{end} exceeds blob size {size}"
                )));
            }

            file.seek(std::io::SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "filesystem"))]
    async fn get_blob_stream(&self, cx: &OpContext, id: &BlobId) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        self.ensure_open()?;
        let path = self.blob_path(id)?;
        let file = cx
            .run(async { fs::File::open(&path).await.map_err(|e| map_read_error(e, id)) })
            .await?;

        let stream: ByteStream = Box::pin(async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        });

        Ok(cx.guard_stream(stream))
    }

    #[instrument(skip(self, cx), fields(backend = "filesystem"))]
    async fn delete_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<()> {
        self.ensure_open()?;
        let path = self.blob_path(id)?;
        cx.run(async {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::Io(e)),
            }
        })
        .await
    }

    fn list_blobs<'a>(&'a self, cx: &OpContext, prefix: &str) -> BlobStream<'a> {
        let prefix = prefix.to_string();

        let stream: BlobStream<'a> = Box::pin(async_stream::try_stream! {
            self.ensure_open()?;

            let mut stack = vec![(self.root.clone(), 0usize, String::new())];
            while let Some((dir, level, parent)) = stack.pop() {
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    // Removed by a concurrent cleanup; nothing left to report.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => Err(StorageError::Io(e))?,
                };

                while let Some(entry) = entries.next_entry().await? {
                    // file_type() does not follow symlinks, so links are never listed.
                    let file_type = match entry.file_type().await {
                        Ok(file_type) => file_type,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => Err(StorageError::Io(e))?,
                    };
                    let file_name = entry.file_name();
                    let Some(name) = file_name.to_str() else {
                        tracing::warn!(dir = %dir.display(), "skipping non-UTF-8 entry");
                        continue;
                    };

                    if file_type.is_dir() {
                        if self.layout.descend(level, &parent, name, &prefix) {
                            stack.push((entry.path(), level + 1, format!("{parent}{name}")));
                        }
                    } else if file_type.is_file()
                        && let Some(id) = self.layout.leaf_id(level, &parent, name, &prefix)
                    {
                        let meta = match entry.metadata().await {
                            Ok(meta) => meta,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => Err(StorageError::Io(e))?,
                        };
                        yield BlobMetadata {
                            id,
                            length: meta.len(),
                            timestamp: meta.modified().ok().map(OffsetDateTime::from),
                        };
                    }
                }
            }
        });

        cx.guard_stream(stream)
    }

    fn connection_info(&self) -> StorageConfig {
        StorageConfig::Filesystem {
            path: self.root.clone(),
            shards: self.layout.shards().clone(),
        }
    }

    #[instrument(skip(self, _cx), fields(backend = "filesystem"))]
    async fn close(&self, _cx: &OpContext) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self, cx), fields(backend = "filesystem"))]
    async fn health_check(&self, cx: &OpContext) -> StorageResult<()> {
        self.ensure_open()?;
        cx.run(async {
            let metadata = fs::metadata(&self.root).await.map_err(|e| {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("storage root not accessible: {e}"),
                ))
            })?;

            if !metadata.is_dir() {
                return Err(StorageError::Config(format!(
                    "storage root is not a directory: {}",
                    self.root.display()
                )));
            }
            Ok(())
        })
        .await
    }
}
