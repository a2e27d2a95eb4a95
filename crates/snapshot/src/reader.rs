//! Lazy resolution of snapshot trees through a blob store.

use crate::directory::Directory;
use crate::error::{SnapshotError, SnapshotResult};
use crate::listing::Listing;
use futures::TryStreamExt;
use stash_core::{Entry, ObjectId};
use stash_storage::{BlobStore, OpContext};
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::instrument;

/// Readable content of a file entry.
pub type ContentReader = Pin<Box<dyn AsyncRead + Send>>;

/// Resolves object ids into directories and file content.
///
/// Holds only a handle to the store; every resolution fetches what it needs
/// for the duration of the call.
#[derive(Clone)]
pub struct SnapshotReader {
    store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl SnapshotReader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Fetch and validate the listing stored under `oid`.
    #[instrument(skip(self, cx), fields(backend = self.store.backend_name()))]
    pub async fn resolve_directory(&self, cx: &OpContext, oid: &ObjectId) -> SnapshotResult<Directory> {
        let data = self
            .store
            .get_blob(cx, oid.blob_id())
            .await
            .map_err(|e| SnapshotError::from_storage(oid, e))?;
        let listing = Listing::decode(oid, &data)?;
        let dir = Directory::from_listing(oid.clone(), listing)?;
        tracing::debug!(entries = dir.len(), "resolved directory");
        Ok(dir)
    }

    /// Attach this reader to `entry` so it can be listed or opened.
    pub fn bind(&self, entry: Entry) -> BoundEntry {
        BoundEntry {
            entry,
            reader: self.clone(),
        }
    }

    /// Resolve a slash-separated path below the directory `root`.
    ///
    /// Empty segments are ignored, so `"a//b/"` equals `"a/b"`.
    #[instrument(skip(self, cx), fields(backend = self.store.backend_name()))]
    pub async fn lookup(&self, cx: &OpContext, root: &ObjectId, path: &str) -> SnapshotResult<Entry> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(SnapshotError::InvalidPath(format!(
                "'{path}' does not name an entry"
            )));
        };

        let mut dir = self.resolve_directory(cx, root).await?;
        for segment in parents {
            let entry = find(&dir, segment)?;
            if !entry.is_dir() {
                return Err(SnapshotError::NotADirectory {
                    name: entry.name.clone(),
                });
            }
            let oid = entry.object_id.clone();
            dir = self.resolve_directory(cx, &oid).await?;
        }
        find(&dir, last).cloned()
    }

    /// Visit every entry below `root` depth-first, in listing order.
    ///
    /// `visit` receives each entry's slash-separated path relative to `root`.
    /// Directories are visited before their children. The walk stops at the
    /// first subtree that cannot be resolved; the error names its object id.
    /// A directory that refers back to one of its ancestors is corrupt.
    #[instrument(skip(self, cx, visit), fields(backend = self.store.backend_name()))]
    pub async fn walk<F>(&self, cx: &OpContext, root: &ObjectId, mut visit: F) -> SnapshotResult<()>
    where
        F: FnMut(&str, &Entry) + Send,
    {
        let root_dir = self.resolve_directory(cx, root).await?;
        let mut stack = vec![(
            root.clone(),
            String::new(),
            root_dir.into_entries().into_iter(),
        )];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some((_, prefix, children)) => children.next().map(|entry| {
                    let path = if prefix.is_empty() {
                        entry.name.clone()
                    } else {
                        format!("{prefix}/{}", entry.name)
                    };
                    (path, entry)
                }),
            };

            let Some((path, entry)) = next else {
                stack.pop();
                continue;
            };

            visit(&path, &entry);
            if entry.is_dir() {
                if let Some((parent, ..)) = stack.last()
                    && stack.iter().any(|(oid, ..)| *oid == entry.object_id)
                {
                    return Err(SnapshotError::Corruption {
                        oid: parent.clone(),
                        reason: format!(
                            "entry '{path}' refers back to ancestor directory {}",
                            entry.object_id
                        ),
                    });
                }
                let dir = self.resolve_directory(cx, &entry.object_id).await?;
                stack.push((entry.object_id.clone(), path, dir.into_entries().into_iter()));
            }
        }
        Ok(())
    }
}

fn find<'a>(dir: &'a Directory, name: &str) -> SnapshotResult<&'a Entry> {
    dir.get(name).ok_or_else(|| SnapshotError::NoSuchEntry {
        oid: dir.object_id().clone(),
        name: name.to_string(),
    })
}

/// An entry bound to the reader that can resolve its content.
///
/// The entry itself stays a plain value; binding adds the `list` and `open`
/// capabilities.
#[derive(Clone, Debug)]
pub struct BoundEntry {
    entry: Entry,
    reader: SnapshotReader,
}

impl BoundEntry {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_entry(self) -> Entry {
        self.entry
    }

    /// Resolve this directory's children. Every call fetches the listing again.
    pub async fn list(&self, cx: &OpContext) -> SnapshotResult<Directory> {
        if !self.entry.is_dir() {
            return Err(SnapshotError::NotADirectory {
                name: self.entry.name.clone(),
            });
        }
        self.reader
            .resolve_directory(cx, &self.entry.object_id)
            .await
    }

    /// Open this file's content. Each call returns an independent reader.
    ///
    /// Reads stay bound to `cx`; cancelling it fails the next read.
    pub async fn open(&self, cx: &OpContext) -> SnapshotResult<ContentReader> {
        if !self.entry.is_file() {
            return Err(SnapshotError::NotAFile {
                name: self.entry.name.clone(),
            });
        }
        let oid = &self.entry.object_id;
        let stream = self
            .reader
            .store
            .get_blob_stream(cx, oid.blob_id())
            .await
            .map_err(|e| SnapshotError::from_storage(oid, e))?;
        Ok(Box::pin(StreamReader::new(stream.map_err(std::io::Error::other))))
    }
}

impl Deref for BoundEntry {
    type Target = Entry;

    fn deref(&self) -> &Entry {
        &self.entry
    }
}
