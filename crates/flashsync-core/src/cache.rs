//! Process-local record cache
//!
//! Holds the last known value of every record together with a dirty flag and
//! a write version. The version lets an upsert that finishes late recognise
//! that a newer local write has replaced its value, so it leaves that value
//! alone.

use crate::record::SyncRecord;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One cached record
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Last known value
    pub record: SyncRecord,
    /// Local value not yet confirmed by the remote store
    pub dirty: bool,
    /// Write version, unique across the cache
    pub version: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: usize,
    /// Entries awaiting remote confirmation
    pub dirty_count: usize,
}

/// Key → record cache shared by one coordinator
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: DashMap<String, CacheEntry>,
    next_version: AtomicU64,
}

impl RecordCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Cached record for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SyncRecord> {
        self.entries.get(key).map(|e| e.record.clone())
    }

    /// Full entry for `key`
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Whether `key` holds an unconfirmed local value
    #[must_use]
    pub fn is_dirty(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.dirty)
    }

    /// Whether `key` is cached
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `record` optimistically and mark it dirty
    ///
    /// Returns the write version to hand back to [`reconcile`](Self::reconcile).
    pub fn stage(&self, key: &str, record: SyncRecord) -> u64 {
        let version = self.bump();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                record,
                dirty: true,
                version,
            },
        );
        version
    }

    /// Accept the remote's copy of a staged write
    ///
    /// Applies only while `version` is still the entry's current version.
    /// Returns whether the entry was updated.
    pub fn reconcile(&self, key: &str, version: u64, confirmed: SyncRecord) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.version == version => {
                entry.record = confirmed;
                entry.dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Load records fetched from the remote store as clean entries
    ///
    /// Entries are keyed by their document key, which also overrides any
    /// `key` field inside the record. Dirty entries survive and keep their
    /// local value. Returns the number of records loaded.
    pub fn replace_all(&self, records: impl IntoIterator<Item = (String, SyncRecord)>) -> usize {
        self.entries.retain(|_, entry| entry.dirty);
        let mut loaded = 0;
        for (key, mut record) in records {
            if self.is_dirty(&key) {
                continue;
            }
            record.key.clone_from(&key);
            let version = self.bump();
            self.entries.insert(
                key,
                CacheEntry {
                    record,
                    dirty: false,
                    version,
                },
            );
            loaded += 1;
        }
        loaded
    }

    /// Keys holding unconfirmed local values
    #[must_use]
    pub fn dirty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.dirty)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of every record, ordered by key
    #[must_use]
    pub fn records(&self) -> Vec<SyncRecord> {
        let mut records: Vec<SyncRecord> = self.entries.iter().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let dirty_count = self.entries.iter().filter(|e| e.dirty).count();
        CacheStats {
            entry_count: self.entries.len(),
            dirty_count,
        }
    }
}
