//! Blob storage abstraction and backends for stash.
//!
//! This crate provides:
//! - The [`BlobStore`] contract with per-operation cancellation
//! - Directory sharding of blob ids on hierarchical backends
//! - Backends: local filesystem and WebDAV
//! - A conformance suite every backend must pass

pub mod backends;
pub mod conformance;
pub mod context;
pub mod error;
pub mod layout;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use backends::webdav::{WebDavBackend, WebDavOptions};
pub use context::OpContext;
pub use error::{StorageError, StorageResult};
pub use layout::ShardedLayout;
pub use traits::{BlobMetadata, BlobStore, BlobStoreExt, BlobStream, ByteStream};

use stash_core::StorageConfig;
use std::sync::Arc;
use std::time::Duration;

/// Connect to the backend described by `config`.
///
/// The backend is health-checked before it is returned, so unreachable
/// servers and rejected credentials surface here.
pub async fn connect(cx: &OpContext, config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    let store: Arc<dyn BlobStore> = match config {
        StorageConfig::Filesystem { path, shards } => {
            Arc::new(FilesystemBackend::new(path, shards.clone()).await?)
        }
        StorageConfig::Webdav {
            url,
            username,
            password,
            shards,
            timeout_secs,
        } => {
            let mut options = WebDavOptions::new(url.clone())
                .with_shards(shards.clone())
                .with_timeout(Duration::from_secs(*timeout_secs));
            options.username = username.clone();
            options.password = password.clone();
            Arc::new(WebDavBackend::new(options)?)
        }
    };

    store.health_check(cx).await?;
    tracing::debug!(
        backend = store.backend_name(),
        shards = %config.shards(),
        "connected to blob storage"
    );
    Ok(store)
}
