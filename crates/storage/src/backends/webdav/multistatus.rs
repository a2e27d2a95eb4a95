//! PROPFIND multistatus response parsing.

use crate::error::{StorageError, StorageResult};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Request body asking for the properties listings need.
pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

/// One `<D:response>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DavResource {
    /// Percent-decoded path component of the href.
    pub path: String,
    pub is_collection: bool,
    pub length: u64,
    pub last_modified: Option<OffsetDateTime>,
}

impl DavResource {
    /// Last non-empty path segment.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    Length,
    Modified,
}

/// Parse a 207 multistatus body.
pub(crate) fn parse_multistatus(body: &str) -> StorageResult<Vec<DavResource>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<(Option<String>, DavResource)> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            StorageError::Protocol(format!(
                "invalid multistatus XML at byte {}: {e}",
                reader.error_position()
            ))
        })?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => current = Some((None, DavResource::default())),
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::Length),
                b"getlastmodified" => field = Some(Field::Modified),
                b"collection" => {
                    if let Some((_, res)) = current.as_mut() {
                        res.is_collection = true;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection"
                    && let Some((_, res)) = current.as_mut()
                {
                    res.is_collection = true;
                }
            }
            Event::Text(text) => {
                let (Some(f), Some((href, res))) = (field, current.as_mut()) else {
                    continue;
                };
                let text = text
                    .unescape()
                    .map_err(|e| StorageError::Protocol(format!("bad XML text: {e}")))?;
                match f {
                    Field::Href => *href = Some(decode_href(&text)?),
                    Field::Length => {
                        res.length = text.trim().parse().map_err(|_| {
                            StorageError::Protocol(format!("bad getcontentlength '{text}'"))
                        })?;
                    }
                    Field::Modified => res.last_modified = parse_http_date(&text),
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some((href, mut res)) = current.take() {
                        res.path = href.ok_or_else(|| {
                            StorageError::Protocol("response without href".to_string())
                        })?;
                        resources.push(res);
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(resources)
}

/// Reduce an href (absolute URL or absolute path) to its decoded path.
fn decode_href(href: &str) -> StorageResult<String> {
    let href = href.trim();
    let path = match href.find("://") {
        Some(scheme_end) => {
            let rest = &href[scheme_end + 3..];
            rest.find('/').map_or("/", |i| &rest[i..])
        }
        None => href,
    };
    percent_decode_str(path)
        .decode_utf8()
        .map(|p| p.into_owned())
        .map_err(|e| StorageError::Protocol(format!("href is not UTF-8: {e}")))
}

/// Parse an RFC 7231 IMF-fixdate.
///
/// Servers disagree on date formats; an unparseable date is logged and
/// dropped rather than failing the listing.
pub(crate) fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    match PrimitiveDateTime::parse(value.trim(), format) {
        Ok(dt) => Some(dt.assume_utc()),
        Err(e) => {
            tracing::warn!(value, error = %e, "ignoring unparseable getlastmodified");
            None
        }
    }
}
