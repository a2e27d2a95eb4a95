//! Minimal in-process WebDAV server backed by a temp directory.
//!
//! Implements the subset of RFC 4918 the backend relies on: GET (with
//! single byte ranges), PUT, DELETE, MKCOL and PROPFIND with depth 0 or 1.
//! Resources are served below `/dav/`.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::task::JoinHandle;

const MOUNT: &str = "/dav";

#[derive(Clone)]
struct DavState {
    root: Arc<PathBuf>,
    credentials: Option<(String, String)>,
    delay: Duration,
}

pub struct DavServer {
    addr: std::net::SocketAddr,
    dir: TempDir,
    handle: JoinHandle<()>,
}

impl DavServer {
    /// Server without authentication.
    pub async fn start() -> Self {
        Self::start_with(None, Duration::ZERO).await
    }

    /// Server requiring HTTP basic auth with the given credentials.
    pub async fn with_auth(username: &str, password: &str) -> Self {
        Self::start_with(
            Some((username.to_string(), password.to_string())),
            Duration::ZERO,
        )
        .await
    }

    /// Server delaying every response.
    pub async fn slow(delay: Duration) -> Self {
        Self::start_with(None, delay).await
    }

    async fn start_with(credentials: Option<(String, String)>, delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = DavState {
            root: Arc::new(dir.path().to_path_buf()),
            credentials,
            delay,
        };
        let app = Router::new().fallback(handle).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, dir, handle }
    }

    /// Base collection URL (without trailing slash).
    pub fn url(&self) -> String {
        format!("http://{}{MOUNT}", self.addr)
    }

    /// Directory holding the served files.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Remove everything below the root.
    pub fn reset(&self) {
        for entry in std::fs::read_dir(self.root()).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                std::fs::remove_dir_all(path).unwrap();
            } else {
                std::fs::remove_file(path).unwrap();
            }
        }
    }
}

impl Drop for DavServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn respond(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

fn authorized(state: &DavState, headers: &HeaderMap) -> Result<(), Response> {
    let Some((user, pass)) = &state.credentials else {
        return Ok(());
    };
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| base64::engine::general_purpose::STANDARD.decode(v).ok())
        .and_then(|v| String::from_utf8(v).ok());

    match supplied {
        None => Err(Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(header::WWW_AUTHENTICATE, r#"Basic realm="testing""#)
            .body(Body::from("Unauthorized.\n"))
            .unwrap()),
        Some(pair) if pair == format!("{user}:{pass}") => Ok(()),
        Some(_) => Err(respond(StatusCode::FORBIDDEN)),
    }
}

/// Map a request path to (relative path, filesystem path).
fn resolve(root: &Path, uri_path: &str) -> Option<(String, PathBuf)> {
    let rel = uri_path.strip_prefix(MOUNT)?;
    let rel = rel.trim_matches('/');
    let mut path = root.to_path_buf();
    for seg in rel.split('/').filter(|s| !s.is_empty()) {
        if seg == "." || seg == ".." {
            return None;
        }
        path.push(seg);
    }
    Some((rel.to_string(), path))
}

async fn handle(State(state): State<DavState>, req: Request) -> Response {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let (parts, body) = req.into_parts();
    if let Err(denied) = authorized(&state, &parts.headers) {
        return denied;
    }
    let Some((rel, path)) = resolve(&state.root, parts.uri.path()) else {
        return respond(StatusCode::NOT_FOUND);
    };

    match parts.method.as_str() {
        "GET" => get(&path, &parts.headers).await,
        "PUT" => {
            if !path.parent().is_some_and(|p| p.is_dir()) {
                return respond(StatusCode::CONFLICT);
            }
            let data = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let existed = path.is_file();
            tokio::fs::write(&path, &data).await.unwrap();
            respond(if existed {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::CREATED
            })
        }
        "DELETE" => {
            if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await.unwrap();
            } else if path.is_file() {
                tokio::fs::remove_file(&path).await.unwrap();
            } else {
                return respond(StatusCode::NOT_FOUND);
            }
            respond(StatusCode::NO_CONTENT)
        }
        "MKCOL" => {
            if path.exists() {
                return respond(StatusCode::METHOD_NOT_ALLOWED);
            }
            if !path.parent().is_some_and(|p| p.is_dir()) {
                return respond(StatusCode::CONFLICT);
            }
            match tokio::fs::create_dir(&path).await {
                Ok(()) => respond(StatusCode::CREATED),
                // Lost a race with a concurrent MKCOL.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    respond(StatusCode::METHOD_NOT_ALLOWED)
                }
                Err(_) => respond(StatusCode::CONFLICT),
            }
        }
        "PROPFIND" => {
            let depth = parts
                .headers
                .get("Depth")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("1");
            propfind(&rel, &path, depth != "0").await
        }
        _ => respond(StatusCode::METHOD_NOT_ALLOWED),
    }
}

async fn get(path: &Path, headers: &HeaderMap) -> Response {
    let Ok(data) = tokio::fs::read(path).await else {
        return respond(StatusCode::NOT_FOUND);
    };
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)));

    match range {
        None => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(data))
            .unwrap(),
        Some((start, _)) if start >= data.len() => respond(StatusCode::RANGE_NOT_SATISFIABLE),
        Some((start, end)) => {
            let end = end.min(data.len() - 1);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{}", data.len()),
                )
                .body(Body::from(data[start..=end].to_vec()))
                .unwrap()
        }
    }
}

fn http_date(modified: std::time::SystemTime) -> String {
    OffsetDateTime::from(modified)
        .format(format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ))
        .unwrap()
}

fn response_xml(href: &str, meta: &std::fs::Metadata) -> String {
    let modified = http_date(meta.modified().unwrap());
    if meta.is_dir() {
        format!(
            "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
             <D:resourcetype><D:collection/></D:resourcetype>\
             <D:getlastmodified>{modified}</D:getlastmodified>\
             </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"
        )
    } else {
        format!(
            "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
             <D:resourcetype/>\
             <D:getcontentlength>{}</D:getcontentlength>\
             <D:getlastmodified>{modified}</D:getlastmodified>\
             </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>",
            meta.len()
        )
    }
}

async fn propfind(rel: &str, path: &Path, children: bool) -> Response {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return respond(StatusCode::NOT_FOUND);
    };
    let base = if rel.is_empty() {
        format!("{MOUNT}/")
    } else {
        format!("{MOUNT}/{rel}/")
    };

    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:">"#);
    let self_href = if meta.is_dir() {
        base.clone()
    } else {
        base.trim_end_matches('/').to_string()
    };
    xml.push_str(&response_xml(&self_href, &meta));

    if children && meta.is_dir() {
        let mut entries = tokio::fs::read_dir(path).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            // Entries can vanish between readdir and stat under concurrent deletes.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let href = if meta.is_dir() {
                format!("{base}{name}/")
            } else {
                format!("{base}{name}")
            };
            xml.push_str(&response_xml(&href, &meta));
        }
    }
    xml.push_str("</D:multistatus>");

    Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(Body::from(xml))
        .unwrap()
}
