//! Content-hash → canonical backup path index, derived from the manifest.
//!
//! Exact-match lookups let the copier satisfy moved or duplicated content
//! with a hardlink instead of a copy. Rebuilt from the manifest at cycle
//! start; the copier inserts new unique objects as they commit, while
//! hardlink commits leave the canonical path unchanged.

use crate::engine::manifest::ManifestEntry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct DedupIndex {
    by_hash: Mutex<HashMap<String, PathBuf>>,
}

impl DedupIndex {
    /// Rebuild from manifest values. When several paths share a hash the
    /// surviving mapping is arbitrary; any of them is a valid hardlink
    /// source.
    pub fn rebuild<'a>(&self, entries: impl Iterator<Item = &'a ManifestEntry>) {
        let mut map = HashMap::new();
        for entry in entries {
            map.insert(entry.hash.clone(), entry.dst_path.clone());
        }
        let count = map.len();
        *self.by_hash.lock().unwrap_or_else(PoisonError::into_inner) = map;
        tracing::debug!(unique_objects = count, "dedup index rebuilt");
    }

    pub fn lookup(&self, hash: &str) -> Option<PathBuf> {
        self.by_hash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
    }

    pub fn insert(&self, hash: &str, dst: PathBuf) {
        self.by_hash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.to_string(), dst);
    }

    pub fn len(&self) -> usize {
        self.by_hash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, dst: &str) -> ManifestEntry {
        ManifestEntry {
            dst_path: PathBuf::from(dst),
            mtime_ns: 0,
            size: 0,
            hash: hash.to_string(),
        }
    }

    #[test]
    fn test_rebuild_and_lookup() {
        let index = DedupIndex::default();
        let entries = [entry("aaa", "/b/one"), entry("bbb", "/b/two")];
        index.rebuild(entries.iter());

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("aaa"), Some(PathBuf::from("/b/one")));
        assert_eq!(index.lookup("zzz"), None);
    }

    #[test]
    fn test_insert_updates_canonical_path() {
        let index = DedupIndex::default();
        index.insert("aaa", PathBuf::from("/b/old"));
        index.insert("aaa", PathBuf::from("/b/new"));
        assert_eq!(index.lookup("aaa"), Some(PathBuf::from("/b/new")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rebuild_replaces_previous_state() {
        let index = DedupIndex::default();
        index.insert("stale", PathBuf::from("/b/stale"));

        let entries = [entry("fresh", "/b/fresh")];
        index.rebuild(entries.iter());

        assert_eq!(index.lookup("stale"), None);
        assert_eq!(index.lookup("fresh"), Some(PathBuf::from("/b/fresh")));
    }
}
