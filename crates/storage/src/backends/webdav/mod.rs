//! WebDAV storage backend.
//!
//! Blobs map onto the same sharded paths as the filesystem backend, relative
//! to a base collection URL. Listing walks the collections with
//! `PROPFIND Depth: 1`.

mod multistatus;

use crate::context::OpContext;
use crate::error::{StorageError, StorageResult};
use crate::layout::ShardedLayout;
use crate::traits::{BlobMetadata, BlobStore, BlobStream, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use multistatus::{PROPFIND_BODY, parse_multistatus};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use stash_core::{BlobId, ShardSpec, StorageConfig};
use std::sync::RwLock;
use std::time::Duration;
use tracing::instrument;

/// PUT attempts when parent collections have to be created first.
const MAX_PUT_ATTEMPTS: usize = 3;

/// Connection settings for [`WebDavBackend`].
#[derive(Clone)]
pub struct WebDavOptions {
    /// Base collection URL.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub shards: ShardSpec,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for WebDavOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavOptions")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("shards", &self.shards)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl WebDavOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            shards: ShardSpec::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_shards(mut self, shards: ShardSpec) -> Self {
        self.shards = shards;
        self
    }

    /// Per-request timeout. Must be a whole number of seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Sharded blob store on a WebDAV collection.
pub struct WebDavBackend {
    /// HTTP client and its connection pool. `None` once closed.
    http: RwLock<Option<reqwest::Client>>,
    /// Base URL with a guaranteed trailing slash, for joining.
    base_url: Url,
    options: WebDavOptions,
    layout: ShardedLayout,
    propfind_method: Method,
    mkcol_method: Method,
}

impl std::fmt::Debug for WebDavBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavBackend")
            .field("base_url", &self.base_url.as_str())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl WebDavBackend {
    /// Build a client for `options`. Performs no I/O.
    ///
    /// The timeout must be a whole number of seconds so that
    /// [`connection_info`](BlobStore::connection_info) reproduces it exactly.
    pub fn new(options: WebDavOptions) -> StorageResult<Self> {
        if options.timeout.is_zero() || options.timeout.subsec_nanos() != 0 {
            return Err(StorageError::Config(format!(
                "WebDAV timeout must be a positive whole number of seconds, got {:?}",
                options.timeout
            )));
        }
        let mut base_url = Url::parse(&options.url)
            .map_err(|e| StorageError::Config(format!("invalid WebDAV URL '{}': {e}", options.url)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(StorageError::Config(format!(
                "unsupported WebDAV URL scheme '{}'",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            http: RwLock::new(Some(http)),
            base_url,
            layout: ShardedLayout::new(options.shards.clone()),
            options,
            propfind_method: dav_method(b"PROPFIND")?,
            mkcol_method: dav_method(b"MKCOL")?,
        })
    }

    fn client(&self) -> StorageResult<reqwest::Client> {
        self.http
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(StorageError::Closed)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        self.client().map(|_| ())
    }

    fn request(&self, method: Method, url: Url) -> StorageResult<RequestBuilder> {
        let req = self.client()?.request(method, url);
        Ok(match &self.options.username {
            Some(user) => req.basic_auth(user, self.options.password.as_deref()),
            None => req,
        })
    }

    fn join(&self, path: &str) -> StorageResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StorageError::Config(format!("failed to build URL for '{path}': {e}")))
    }

    /// URL of a collection below the base, with a trailing slash.
    fn collection_url(&self, dirs: &[String]) -> StorageResult<Url> {
        if dirs.is_empty() {
            return Ok(self.base_url.clone());
        }
        self.join(&format!("{}/", dirs.join("/")))
    }

    /// Create each missing collection in `dirs`, outermost first.
    async fn create_collections(&self, dirs: &[String]) -> StorageResult<()> {
        for depth in 1..=dirs.len() {
            let url = self.collection_url(&dirs[..depth])?;
            let response = self.request(self.mkcol_method.clone(), url.clone())?.send().await?;
            match response.status() {
                // 405: collection already exists.
                s if s.is_success() || s == StatusCode::METHOD_NOT_ALLOWED => {}
                // 409: an outer collection vanished again; the caller retries.
                StatusCode::CONFLICT => {
                    tracing::debug!(url = %url, "parent collection missing during MKCOL");
                    return Ok(());
                }
                s => return Err(status_error(s, format!("MKCOL {url}"))),
            }
        }
        Ok(())
    }

    /// Issue `PROPFIND` with the given depth and parse the reply.
    async fn propfind(&self, url: Url, depth: u8) -> StorageResult<Option<Vec<multistatus::DavResource>>> {
        let response = self
            .request(self.propfind_method.clone(), url.clone())?
            .header("Depth", depth.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        match response.status() {
            StatusCode::MULTI_STATUS => {
                let body = response.text().await?;
                parse_multistatus(&body).map(Some)
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(status_error(s, format!("PROPFIND {url}"))),
        }
    }
}

fn dav_method(name: &'static [u8]) -> StorageResult<Method> {
    Method::from_bytes(name).map_err(|e| StorageError::Config(format!("invalid HTTP method: {e}")))
}

/// Map a failed HTTP status onto the error taxonomy.
fn status_error(status: StatusCode, context: String) -> StorageError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::Unauthorized(format!("{context}: {status}"))
        }
        StatusCode::NOT_FOUND => StorageError::NotFound(context),
        StatusCode::RANGE_NOT_SATISFIABLE => StorageError::InvalidRange(context),
        s => StorageError::UnexpectedStatus {
            status: s.as_u16(),
            context,
        },
    }
}

fn trimmed(path: &str) -> &str {
    path.trim_end_matches('/')
}

#[async_trait]
impl BlobStore for WebDavBackend {
    #[instrument(skip(self, cx, data), fields(backend = "webdav", size = data.len()))]
    async fn put_blob(&self, cx: &OpContext, id: &BlobId, data: Bytes) -> StorageResult<()> {
        self.ensure_open()?;
        let placed = self.layout.place(id)?;
        let url = self.join(&placed.relative_path())?;

        cx.run(async {
            let mut last_status = StatusCode::CONFLICT;
            for attempt in 1..=MAX_PUT_ATTEMPTS {
                let response = self
                    .request(Method::PUT, url.clone())?
                    .body(data.clone())
                    .send()
                    .await?;
                match response.status() {
                    s if s.is_success() => return Ok(()),
                    s @ (StatusCode::CONFLICT | StatusCode::NOT_FOUND) if !placed.dirs.is_empty() => {
                        tracing::debug!(attempt, status = %s, "creating parent collections");
                        last_status = s;
                        self.create_collections(&placed.dirs).await?;
                    }
                    s => return Err(status_error(s, format!("PUT {url}"))),
                }
            }
            Err(StorageError::UnexpectedStatus {
                status: last_status.as_u16(),
                context: format!("PUT {url} after {MAX_PUT_ATTEMPTS} attempts"),
            })
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "webdav"))]
    async fn get_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<Bytes> {
        self.ensure_open()?;
        let url = self.join(&self.layout.place(id)?.relative_path())?;

        cx.run(async {
            let response = self.request(Method::GET, url)?.send().await?;
            match response.status() {
                StatusCode::OK => Ok(response.bytes().await?),
                StatusCode::NOT_FOUND => Err(StorageError::NotFound(id.to_string())),
                s => Err(status_error(s, format!("GET {id}"))),
            }
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "webdav"))]
    async fn get_blob_range(
        &self,
        cx: &OpContext,
        id: &BlobId,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        self.ensure_open()?;
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = offset.checked_add(length).ok_or_else(|| {
            StorageError::InvalidRange(format!("offset {offset} + length {length} overflows"))
        })?;
        let url = self.join(&self.layout.place(id)?.relative_path())?;

        cx.run(async {
            let response = self
                .request(Method::GET, url)?
                .header(reqwest::header::RANGE, format!("bytes={offset}-{}", end - 1))
                .send()
                .await?;

            let out_of_range = || {
                StorageError::InvalidRange(format!("range {offset}..{end} exceeds blob {id}"))
            };
            match response.status() {
                StatusCode::PARTIAL_CONTENT => {
                    let body = response.bytes().await?;
                    // Servers clamp ranges that run past the end.
                    if body.len() as u64 != length {
                        return Err(out_of_range());
                    }
                    Ok(body)
                }
                StatusCode::OK => {
                    // Range header ignored; slice locally.
                    let body = response.bytes().await?;
                    if end > body.len() as u64 {
                        return Err(out_of_range());
                    }
                    Ok(body.slice(offset as usize..end as usize))
                }
                StatusCode::NOT_FOUND => Err(StorageError::NotFound(id.to_string())),
                StatusCode::RANGE_NOT_SATISFIABLE => Err(out_of_range()),
                s => Err(status_error(s, format!("GET {id} range"))),
            }
        })
        .await
    }

    #[instrument(skip(self, cx), fields(backend = "webdav"))]
    async fn get_blob_stream(&self, cx: &OpContext, id: &BlobId) -> StorageResult<ByteStream> {
        self.ensure_open()?;
        let url = self.join(&self.layout.place(id)?.relative_path())?;

        let response = cx
            .run(async {
                let response = self.request(Method::GET, url)?.send().await?;
                match response.status() {
                    StatusCode::OK => Ok(response),
                    StatusCode::NOT_FOUND => Err(StorageError::NotFound(id.to_string())),
                    s => Err(status_error(s, format!("GET {id}"))),
                }
            })
            .await?;

        let stream: ByteStream = Box::pin(response.bytes_stream().map_err(StorageError::Http));
        Ok(cx.guard_stream(stream))
    }

    #[instrument(skip(self, cx), fields(backend = "webdav"))]
    async fn delete_blob(&self, cx: &OpContext, id: &BlobId) -> StorageResult<()> {
        self.ensure_open()?;
        let url = self.join(&self.layout.place(id)?.relative_path())?;

        cx.run(async {
            let response = self.request(Method::DELETE, url)?.send().await?;
            match response.status() {
                s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
                s => Err(status_error(s, format!("DELETE {id}"))),
            }
        })
        .await
    }

    fn list_blobs<'a>(&'a self, cx: &OpContext, prefix: &str) -> BlobStream<'a> {
        let prefix = prefix.to_string();

        let stream: BlobStream<'a> = Box::pin(async_stream::try_stream! {
            self.ensure_open()?;

            let mut stack: Vec<Vec<String>> = vec![Vec::new()];
            while let Some(dirs) = stack.pop() {
                let url = self.collection_url(&dirs)?;
                let self_path = percent_encoding::percent_decode_str(url.path())
                    .decode_utf8_lossy()
                    .into_owned();
                let Some(resources) = self.propfind(url, 1).await? else {
                    // Removed by a concurrent cleanup.
                    continue;
                };

                let level = dirs.len();
                let parent = dirs.concat();
                for resource in resources {
                    if trimmed(&resource.path) == trimmed(&self_path) {
                        continue;
                    }
                    let name = resource.name();
                    if resource.is_collection {
                        if self.layout.descend(level, &parent, name, &prefix) {
                            let mut child = dirs.clone();
                            child.push(name.to_string());
                            stack.push(child);
                        }
                    } else if let Some(id) = self.layout.leaf_id(level, &parent, name, &prefix) {
                        yield BlobMetadata {
                            id,
                            length: resource.length,
                            timestamp: resource.last_modified,
                        };
                    }
                }
            }
        });

        cx.guard_stream(stream)
    }

    fn connection_info(&self) -> StorageConfig {
        StorageConfig::Webdav {
            url: self.options.url.clone(),
            username: self.options.username.clone(),
            password: self.options.password.clone(),
            shards: self.options.shards.clone(),
            timeout_secs: self.options.timeout.as_secs(),
        }
    }

    #[instrument(skip(self, _cx), fields(backend = "webdav"))]
    async fn close(&self, _cx: &OpContext) -> StorageResult<()> {
        // Dropping the client releases its pooled connections; requests
        // already in flight keep their own handle until they finish.
        let client = self
            .http
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match client {
            Some(_) => Ok(()),
            None => Err(StorageError::Closed),
        }
    }

    fn backend_name(&self) -> &'static str {
        "webdav"
    }

    #[instrument(skip(self, cx), fields(backend = "webdav"))]
    async fn health_check(&self, cx: &OpContext) -> StorageResult<()> {
        self.ensure_open()?;
        cx.run(async {
            match self.propfind(self.base_url.clone(), 0).await? {
                Some(_) => Ok(()),
                None => Err(StorageError::Config(format!(
                    "collection does not exist: {}",
                    self.options.url
                ))),
            }
        })
        .await
    }
}
