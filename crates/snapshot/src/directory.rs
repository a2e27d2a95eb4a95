//! Materialized directory: ordered children plus a name index.

use crate::error::{SnapshotError, SnapshotResult};
use crate::listing::Listing;
use stash_core::{Entry, ObjectId};
use std::collections::HashMap;

/// Children of one snapshot directory.
///
/// `entries()` preserves the order the tree walker produced; `get()` is a
/// lookup index rebuilt from that order and never consulted for ordering.
#[derive(Clone, Debug)]
pub struct Directory {
    oid: ObjectId,
    ordered: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl Directory {
    /// Validate a decoded listing and index it.
    ///
    /// Fails with `Corruption` on a checksum mismatch, a duplicate name, or a
    /// name that cannot appear in a path.
    pub fn from_listing(oid: ObjectId, listing: Listing) -> SnapshotResult<Self> {
        let corrupt = |reason: String| SnapshotError::Corruption {
            oid: oid.clone(),
            reason,
        };

        let mut by_name = HashMap::with_capacity(listing.entries.len());
        for (idx, entry) in listing.entries.iter().enumerate() {
            if entry.name.is_empty() || entry.name.contains('/') {
                return Err(corrupt(format!("invalid entry name '{}'", entry.name)));
            }
            if !entry.verify_checksum() {
                return Err(corrupt(format!(
                    "metadata checksum mismatch for entry '{}'",
                    entry.name
                )));
            }
            if by_name.insert(entry.name.clone(), idx).is_some() {
                return Err(corrupt(format!("duplicate entry name '{}'", entry.name)));
            }
        }

        Ok(Self {
            oid,
            ordered: listing.entries,
            by_name,
        })
    }

    /// Object id of the listing this directory was resolved from.
    pub fn object_id(&self) -> &ObjectId {
        &self.oid
    }

    pub fn entries(&self) -> &[Entry] {
        &self.ordered
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.ordered
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).map(|&idx| &self.ordered[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.ordered.iter()
    }
}

impl<'a> IntoIterator for &'a Directory {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_core::{ErrorKind, EntryType};
    use time::macros::datetime;

    fn entry(name: &str, entry_type: EntryType) -> Entry {
        Entry {
            name: name.to_string(),
            size: 10,
            entry_type,
            mod_time: datetime!(2023-07-14 08:30:00 UTC),
            mode: 0o755,
            user_id: 0,
            group_id: 0,
            object_id: ObjectId::new(format!("o{}", name.len())).unwrap(),
            metadata_crc32: 0,
        }
        .sealed()
    }

    fn oid() -> ObjectId {
        ObjectId::new("listing1").unwrap()
    }

    #[test]
    fn test_index_matches_ordered_entries() {
        let listing = Listing::new(vec![
            entry("b", EntryType::File),
            entry("a", EntryType::Directory),
            entry("c", EntryType::Symlink),
        ]);
        let dir = Directory::from_listing(oid(), listing).unwrap();

        assert_eq!(dir.len(), 3);
        let names: Vec<_> = dir.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        for e in &dir {
            assert_eq!(dir.get(&e.name).unwrap().name, e.name);
        }
        assert!(dir.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_names_are_corruption() {
        let listing = Listing::new(vec![
            entry("same", EntryType::File),
            entry("same", EntryType::Directory),
        ]);
        let err = Directory::from_listing(oid(), listing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_tampered_entry_is_corruption() {
        let mut tampered = entry("f", EntryType::File);
        tampered.size += 1;
        let listing = Listing::new(vec![entry("ok", EntryType::File), tampered]);
        let err = Directory::from_listing(oid(), listing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert_eq!(err.object_id(), Some(&oid()));
    }

    #[test]
    fn test_slash_in_name_is_corruption() {
        let listing = Listing::new(vec![entry("a/b", EntryType::File)]);
        assert!(Directory::from_listing(oid(), listing).is_err());
    }

    #[test]
    fn test_empty_listing_is_valid() {
        let dir = Directory::from_listing(oid(), Listing::default()).unwrap();
        assert!(dir.is_empty());
    }
}
