//! Blob and object identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted identifier length.
pub const MAX_ID_LEN: usize = 255;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Check whether `s` is made only of characters allowed in a blob id.
///
/// Used by backends to tell id fragments apart from foreign files (temp
/// files, editor droppings) while listing.
pub fn is_id_fragment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_id_char)
}

fn check_id(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.len() > MAX_ID_LEN {
        return Err(format!("length {} exceeds {MAX_ID_LEN}", s.len()));
    }
    if let Some(c) = s.chars().find(|c| !is_id_char(*c)) {
        return Err(format!("contains disallowed character {c:?}"));
    }
    if s == "." || s == ".." {
        return Err("reserved path component".to_string());
    }
    Ok(())
}

/// Opaque content-derived identifier naming a stored byte sequence.
///
/// The alphabet is restricted to ASCII alphanumerics plus `-`, `_` and `.`,
/// so byte offsets and character offsets coincide when sharding.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Validate and wrap an identifier.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        match check_id(&id) {
            Ok(()) => Ok(Self(id)),
            Err(reason) => Err(crate::Error::InvalidBlobId { id, reason }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the logical id starts with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for BlobId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

impl FromStr for BlobId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference used by snapshot entries to locate their content or listing.
///
/// Objects are resolved one-to-one onto blobs; how the id was derived
/// (hashing, splitting) is decided upstream.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(BlobId);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        match check_id(&id) {
            Ok(()) => Ok(Self(BlobId(id))),
            Err(reason) => Err(crate::Error::InvalidObjectId { id, reason }),
        }
    }

    /// The blob holding this object's bytes.
    pub fn blob_id(&self) -> &BlobId {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<BlobId> for ObjectId {
    fn from(id: BlobId) -> Self {
        Self(id)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0.0
    }
}

impl FromStr for ObjectId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::new(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
