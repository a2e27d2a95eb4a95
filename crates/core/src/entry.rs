//! Snapshot entry metadata.

use crate::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// Kind of filesystem node an entry describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Directory,
    #[serde(rename = "l")]
    Symlink,
    #[serde(rename = "s")]
    Socket,
    #[serde(rename = "v")]
    Device,
    #[serde(rename = "n")]
    NamedPipe,
}

impl EntryType {
    /// Single-letter code used in listings.
    pub fn code(self) -> &'static str {
        match self {
            Self::File => "f",
            Self::Directory => "d",
            Self::Symlink => "l",
            Self::Socket => "s",
            Self::Device => "v",
            Self::NamedPipe => "n",
        }
    }

    pub fn from_code(code: &str) -> crate::Result<Self> {
        match code {
            "f" => Ok(Self::File),
            "d" => Ok(Self::Directory),
            "l" => Ok(Self::Symlink),
            "s" => Ok(Self::Socket),
            "v" => Ok(Self::Device),
            "n" => Ok(Self::NamedPipe),
            other => Err(crate::Error::InvalidEntryType(other.to_string())),
        }
    }

    /// Classify POSIX `st_mode` bits. Unknown formats count as files.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => Self::Directory,
            S_IFCHR | S_IFBLK => Self::Device,
            S_IFSOCK => Self::Socket,
            S_IFLNK => Self::Symlink,
            S_IFIFO => Self::NamedPipe,
            _ => Self::File,
        }
    }

    #[cfg(unix)]
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;

        if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_block_device() || ft.is_char_device() {
            Self::Device
        } else if ft.is_socket() {
            Self::Socket
        } else if ft.is_fifo() {
            Self::NamedPipe
        } else {
            Self::File
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Metadata for one node of a snapshot tree.
///
/// Entries are immutable values: a changed file yields a new entry with a new
/// object id. `metadata_crc32` covers every other field and is checked when a
/// listing is resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(with = "time::serde::rfc3339")]
    pub mod_time: OffsetDateTime,
    /// Permission bits (`0o0000..=0o7777`).
    pub mode: u16,
    pub user_id: u32,
    pub group_id: u32,
    pub object_id: ObjectId,
    pub metadata_crc32: u32,
}

impl Entry {
    /// CRC-32 over the canonical encoding of all metadata fields.
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(self.name.len() as u32).to_le_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update(&self.size.to_le_bytes());
        hasher.update(self.entry_type.code().as_bytes());
        hasher.update(&self.mod_time.unix_timestamp_nanos().to_le_bytes());
        hasher.update(&self.mode.to_le_bytes());
        hasher.update(&self.user_id.to_le_bytes());
        hasher.update(&self.group_id.to_le_bytes());
        let oid = self.object_id.as_str();
        hasher.update(&(oid.len() as u32).to_le_bytes());
        hasher.update(oid.as_bytes());
        hasher.finalize()
    }

    /// Return the entry with its checksum filled in.
    pub fn sealed(mut self) -> Self {
        self.metadata_crc32 = self.compute_checksum();
        self
    }

    pub fn verify_checksum(&self) -> bool {
        self.metadata_crc32 == self.compute_checksum()
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: '{}' type: {} modTime: {} size: {} oid: '{}' uid: {} gid: {}",
            self.name,
            self.entry_type,
            self.mod_time,
            self.size,
            self.object_id,
            self.user_id,
            self.group_id
        )
    }
}
