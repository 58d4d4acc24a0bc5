//! Sync coordinator
//!
//! Reconciles optimistic local writes with a remote store that can only be
//! read and replaced as a whole:
//!
//! - one bulk fetch per dataset load populates the cache; reads after that
//!   never touch the network
//! - every write lands in the cache first, then travels to the remote as a
//!   single queued read-merge-write
//! - remote failures never surface as errors; callers get a success flag and
//!   the cache keeps the local value marked dirty

use crate::cache::RecordCache;
use crate::config::{RetryPolicy, SyncConfig};
use crate::error::SyncError;
use crate::key::{DatasetNamespace, RowId};
use crate::local::ViewSettings;
use crate::record::{is_data_equal, SyncRecord};
use dashmap::DashMap;
use flashsync_queue::{QueueConfig, QueueError, QueueStatus, RequestQueue};
use flashsync_store::{Document, DocumentStore, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Options for [`SyncCoordinator::upsert_record`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Write even when the cached record already holds the same data
    pub force: bool,
}

impl UpsertOptions {
    /// Options that bypass the unchanged-record check
    #[inline]
    #[must_use]
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Whether the remote store now holds the record
    pub success: bool,
    /// Record as it stands after the call
    pub record: SyncRecord,
}

/// Whether a cached record is confirmed by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Cached and confirmed
    Synced,
    /// Missing from the cache or holding an unconfirmed local value
    Local,
}

impl SyncStatus {
    /// Short label for display
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::Local => "Local",
        }
    }
}

/// Ratings and settings of one dataset as found in the cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredState {
    /// The dataset's settings record
    pub settings: Option<SyncRecord>,
    /// Row → stars for every rated item record of the dataset
    pub ratings: BTreeMap<RowId, u8>,
}

/// Outcome of [`SyncCoordinator::bulk_sync_from_remote`]
#[derive(Debug, Clone, PartialEq)]
pub enum BulkSync {
    /// Cache already populated; nothing fetched
    Skipped,
    /// Remote unreachable; continuing with local data only
    Unavailable,
    /// Remote document loaded
    Restored {
        /// Records now cached from the remote document
        loaded: usize,
        /// Entries that did not decode as records
        undecodable: usize,
        /// State of the requested dataset
        state: RestoredState,
    },
}

/// Summary of [`SyncCoordinator::resync_dirty`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Dirty entries found
    pub attempted: usize,
    /// Entries now confirmed
    pub synced: usize,
    /// Entries still dirty
    pub failed: usize,
}

struct Inner<S> {
    store: Arc<S>,
    queue: RequestQueue<StoreError>,
    cache: RecordCache,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    retry: RetryPolicy,
}

/// Owns the record cache and request queue of one session
pub struct SyncCoordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SyncCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for SyncCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("cache", &self.inner.cache.stats())
            .field("queue", &self.inner.queue)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> SyncCoordinator<S> {
    /// Create coordinator with explicit queue limits and retry schedule
    ///
    /// Must be called from within a tokio runtime before any operation runs.
    #[must_use]
    pub fn new(store: Arc<S>, queue: QueueConfig, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                queue: RequestQueue::new(queue),
                cache: RecordCache::new(),
                key_locks: DashMap::new(),
                retry,
            }),
        }
    }

    /// Create coordinator from a validated [`SyncConfig`]
    ///
    /// # Errors
    /// - `SyncError::Config` if the queue limits are unusable
    pub fn from_config(store: Arc<S>, config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self::new(store, config.queue.clone(), config.retry.clone()))
    }

    /// Record cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &RecordCache {
        &self.inner.cache
    }

    /// Remote store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Request queue snapshot
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        self.inner.queue.status()
    }

    /// Populate the cache from the remote document
    ///
    /// Does nothing when the cache already holds any record. Otherwise
    /// fetches the whole document through the queue (one network operation)
    /// and returns the ratings and settings found for `namespace`.
    pub async fn bulk_sync_from_remote(&self, namespace: &DatasetNamespace) -> BulkSync {
        if !self.inner.cache.is_empty() {
            tracing::debug!(
                namespace = %namespace,
                cached = self.inner.cache.len(),
                "Cache already populated; skipping bulk sync"
            );
            return BulkSync::Skipped;
        }

        let store = Arc::clone(&self.inner.store);
        let fetched = self
            .inner
            .queue
            .enqueue(move || {
                let store = Arc::clone(&store);
                async move { store.fetch_document().await }
            })
            .await;

        let document = match fetched {
            Ok(document) => document,
            Err(error) => {
                tracing::warn!(
                    namespace = %namespace,
                    error = %error,
                    "Bulk sync failed; continuing with local data only"
                );
                return BulkSync::Unavailable;
            }
        };

        let (records, undecodable) = decode_records(document);
        let loaded = self.inner.cache.replace_all(records);
        let state = self.restored_state(namespace);
        tracing::info!(
            namespace = %namespace,
            loaded,
            undecodable,
            ratings = state.ratings.len(),
            settings = state.settings.is_some(),
            "Bulk sync complete"
        );
        BulkSync::Restored {
            loaded,
            undecodable,
            state,
        }
    }

    /// Ratings and settings of `namespace` currently in the cache
    #[must_use]
    pub fn restored_state(&self, namespace: &DatasetNamespace) -> RestoredState {
        let settings_key = namespace.settings_key();
        let mut state = RestoredState::default();
        for record in self.inner.cache.records() {
            if record.key == settings_key {
                state.settings = Some(record);
                continue;
            }
            if let (Some(row), Some(stars)) = (namespace.row_of(&record.key), record.stars) {
                state.ratings.insert(RowId::from(row), stars);
            }
        }
        state
    }

    /// Cached record for `key`; never touches the network
    #[inline]
    #[must_use]
    pub fn get_record(&self, key: &str) -> Option<SyncRecord> {
        self.inner.cache.get(key)
    }

    /// Sync state of the record under `key`
    #[must_use]
    pub fn sync_status(&self, key: &str) -> SyncStatus {
        if self.inner.cache.contains(key) && !self.inner.cache.is_dirty(key) {
            SyncStatus::Synced
        } else {
            SyncStatus::Local
        }
    }

    /// Write `record` locally and to the remote store
    ///
    /// Unless `options.force` is set, a record that matches the cached one on
    /// every sync-relevant field returns immediately without network access.
    /// Otherwise the cache takes the new value at once and the remote write
    /// runs under a per-key lock, so writes to one key never interleave.
    pub async fn upsert_record(&self, key: &str, mut record: SyncRecord, options: UpsertOptions) -> UpsertOutcome {
        if record.key.is_empty() {
            record.key = key.to_string();
        }

        if !options.force {
            if let Some(existing) = self.inner.cache.get(key) {
                if is_data_equal(Some(&existing), Some(&record)) {
                    tracing::debug!(key, "Record unchanged; skipping remote write");
                    return UpsertOutcome {
                        success: true,
                        record: existing,
                    };
                }
            }
        }

        let version = self.inner.cache.stage(key, record.clone());
        let handle = self.key_lock(key);
        let _guard = handle.lock.lock().await;
        self.write_through(key, version, record).await
    }

    async fn write_through(&self, key: &str, version: u64, record: SyncRecord) -> UpsertOutcome {
        let value = match record.to_value() {
            Ok(value) => value,
            Err(error) => {
                let error = SyncError::Encode {
                    key: key.to_string(),
                    source: error,
                };
                tracing::warn!(key, error = %error, "Keeping record local");
                return UpsertOutcome {
                    success: false,
                    record,
                };
            }
        };

        let mut retries = 0;
        loop {
            match self.enqueue_upsert(key, value.clone()).await {
                Ok(stored) => {
                    let confirmed = SyncRecord::from_value(key, &stored).unwrap_or_else(|error| {
                        tracing::debug!(key, error = %error, "Remote echoed an undecodable record");
                        record.clone()
                    });
                    if self.inner.cache.reconcile(key, version, confirmed.clone()) {
                        tracing::info!(key, retries, "Record synced");
                    } else {
                        tracing::debug!(key, "Newer local write pending; leaving cache as is");
                    }
                    return UpsertOutcome {
                        success: true,
                        record: confirmed,
                    };
                }
                Err(error) => {
                    if self.inner.retry.should_retry(error.operation_error(), retries) {
                        retries += 1;
                        let delay = self.inner.retry.delay_for(retries);
                        tracing::warn!(key, retries, ?delay, error = %error, "Upsert failed; retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(key, retries, error = %error, "Upsert failed; keeping local value");
                    return UpsertOutcome {
                        success: false,
                        record,
                    };
                }
            }
        }
    }

    async fn enqueue_upsert(&self, key: &str, value: Value) -> Result<Value, QueueError<StoreError>> {
        let store = Arc::clone(&self.inner.store);
        let key = key.to_string();
        self.inner
            .queue
            .enqueue(move || {
                let store = Arc::clone(&store);
                let key = key.clone();
                let value = value.clone();
                async move { store.upsert_key(&key, value).await }
            })
            .await
    }

    fn key_lock<'a>(&'a self, key: &'a str) -> KeyLock<'a> {
        let lock = Arc::clone(self.inner.key_locks.entry(key.to_string()).or_default().value());
        KeyLock {
            locks: &self.inner.key_locks,
            key,
            lock,
        }
    }

    /// Record the row last shown for `namespace` in its settings record
    ///
    /// Starts from the cached settings record, or from `current_view` when
    /// there is none. Remote failures are logged only.
    ///
    /// # Errors
    /// - `SyncError::InvalidRow` if `row` is zero
    pub async fn save_view_position(
        &self,
        namespace: &DatasetNamespace,
        row: u32,
        current_view: &ViewSettings,
    ) -> Result<UpsertOutcome, SyncError> {
        if row == 0 {
            return Err(SyncError::InvalidRow(row));
        }
        let key = namespace.settings_key();
        let record = self
            .inner
            .cache
            .get(&key)
            .unwrap_or_else(|| current_view.to_settings_record(&key))
            .with_last_viewed_row(row)
            .touched();
        let outcome = self.upsert_record(&key, record, UpsertOptions::default()).await;
        if outcome.success {
            tracing::debug!(key, row, "View position saved");
        }
        Ok(outcome)
    }

    /// [`save_view_position`](Self::save_view_position) on a background task
    pub fn spawn_save_view_position(
        &self,
        namespace: DatasetNamespace,
        row: u32,
        current_view: ViewSettings,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match coordinator.save_view_position(&namespace, row, &current_view).await {
                Ok(outcome) if !outcome.success => {
                    tracing::warn!(namespace = %namespace, row, "View position kept locally");
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(namespace = %namespace, error = %error, "View position not saved"),
            }
        })
    }

    /// Push every dirty cache entry to the remote store again
    pub async fn resync_dirty(&self) -> ResyncReport {
        let keys = self.inner.cache.dirty_keys();
        let mut report = ResyncReport {
            attempted: keys.len(),
            ..ResyncReport::default()
        };

        let writes = keys.into_iter().filter_map(|key| {
            let record = self.inner.cache.get(&key)?;
            Some(async move { self.upsert_record(&key, record, UpsertOptions::forced()).await })
        });
        for outcome in futures::future::join_all(writes).await {
            if outcome.success {
                report.synced += 1;
            } else {
                report.failed += 1;
            }
        }
        tracing::info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed,
            "Resync of dirty records finished"
        );
        report
    }
}

/// Shared write lock of one key
///
/// Dropping the last handle removes the lock from the map, including when
/// the owning upsert is cancelled mid-flight.
struct KeyLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // The map and this handle hold two references.
        self.locks.remove_if(self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) <= 2
        });
    }
}

fn decode_records(document: Document) -> (Vec<(String, SyncRecord)>, usize) {
    let mut records = Vec::with_capacity(document.len());
    let mut undecodable = 0;
    for (key, value) in document {
        match SyncRecord::from_value(&key, &value) {
            Ok(record) => records.push((key, record)),
            Err(error) => {
                undecodable += 1;
                tracing::debug!(key = %key, error = %error, "Skipping undecodable remote entry");
            }
        }
    }
    (records, undecodable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashsync_store::MemoryDocumentStore;
    use serde_json::json;
    use std::time::Duration;

    fn quick_queue() -> QueueConfig {
        QueueConfig::new()
            .with_min_interval(Duration::ZERO)
            .with_rate_limit(1_000, Duration::from_secs(60))
    }

    fn coordinator(document: Document) -> SyncCoordinator<MemoryDocumentStore> {
        SyncCoordinator::new(
            Arc::new(MemoryDocumentStore::with_document(document)),
            quick_queue(),
            RetryPolicy::none(),
        )
    }

    #[tokio::test]
    async fn restored_state_reads_only_own_namespace() {
        let doc: Document = vec![
            ("vocab1-3".to_string(), json!({"stars": 4})),
            ("vocab1-w-17".to_string(), json!({"stars": 1})),
            ("vocab10-3".to_string(), json!({"stars": 5})),
            ("vocab1_settings".to_string(), json!({"sortByStars": true, "lastViewedRow": 12})),
            ("vocab1-9".to_string(), json!({"lastViewedRow": null})),
        ]
        .into_iter()
        .collect();
        let coordinator = coordinator(doc);
        let ns = DatasetNamespace::from_dataset_name("vocab1.csv");

        let BulkSync::Restored { loaded, state, .. } = coordinator.bulk_sync_from_remote(&ns).await else {
            panic!("expected a restore");
        };
        assert_eq!(loaded, 5);
        assert_eq!(state.ratings.len(), 2);
        assert_eq!(state.ratings.get(&RowId::from("w-17")), Some(&1));
        let settings = state.settings.unwrap();
        assert_eq!(settings.sort_by_stars, Some(true));
        assert_eq!(settings.last_viewed_row, Some(12));
    }

    #[tokio::test]
    async fn undecodable_entries_are_counted_not_cached() {
        let doc: Document = vec![
            ("a-1".to_string(), json!({"stars": 2})),
            ("a-2".to_string(), json!("not a record")),
        ]
        .into_iter()
        .collect();
        let coordinator = coordinator(doc);

        let outcome = coordinator
            .bulk_sync_from_remote(&DatasetNamespace::from_dataset_name("a"))
            .await;
        assert!(matches!(outcome, BulkSync::Restored { loaded: 1, undecodable: 1, .. }));
        assert!(coordinator.get_record("a-2").is_none());
    }

    #[tokio::test]
    async fn sync_status_tracks_confirmation() {
        let coordinator = coordinator(Document::new());
        assert_eq!(coordinator.sync_status("a-1"), SyncStatus::Local);

        let outcome = coordinator
            .upsert_record("a-1", SyncRecord::new_item("a-1", 3), UpsertOptions::default())
            .await;
        assert!(outcome.success);
        assert_eq!(coordinator.sync_status("a-1"), SyncStatus::Synced);
        assert_eq!(SyncStatus::Synced.label(), "Synced");
    }

    #[tokio::test]
    async fn view_position_builds_settings_from_current_view() {
        let coordinator = coordinator(Document::new());
        let ns = DatasetNamespace::from_dataset_name("vocab1.csv");
        let view = ViewSettings {
            sort_by_stars: true,
            ..ViewSettings::default()
        };

        let outcome = coordinator.save_view_position(&ns, 42, &view).await.unwrap();
        assert!(outcome.success);
        let stored = coordinator.store().snapshot();
        let settings = stored.get("vocab1_settings").unwrap();
        assert_eq!(settings["lastViewedRow"], json!(42));
        assert_eq!(settings["sortByStars"], json!(true));
        assert_eq!(settings["filterLevel"], json!("all"));

        assert!(matches!(
            coordinator.save_view_position(&ns, 0, &view).await,
            Err(SyncError::InvalidRow(0))
        ));
    }

    #[tokio::test]
    async fn key_locks_are_released() {
        let coordinator = coordinator(Document::new());
        coordinator
            .upsert_record("a-1", SyncRecord::new_item("a-1", 1), UpsertOptions::default())
            .await;
        assert!(coordinator.inner.key_locks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_upsert_releases_its_key_lock() {
        let coordinator = coordinator(Document::new());
        let held = coordinator.key_lock("a-1");
        let guard = held.lock.lock().await;

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .upsert_record("a-1", SyncRecord::new_item("a-1", 2), UpsertOptions::default())
                    .await
            })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        drop(guard);
        drop(held);
        assert!(coordinator.inner.key_locks.is_empty());
        assert!(coordinator.cache().is_dirty("a-1"));
    }

    #[tokio::test]
    async fn bulk_sync_caches_under_document_keys() {
        let doc: Document = vec![("vocab1-3".to_string(), json!({"key": "vocab1-4", "stars": 4}))]
            .into_iter()
            .collect();
        let coordinator = coordinator(doc);
        let ns = DatasetNamespace::from_dataset_name("vocab1.csv");

        let BulkSync::Restored { state, .. } = coordinator.bulk_sync_from_remote(&ns).await else {
            panic!("expected a restore");
        };
        assert_eq!(coordinator.get_record("vocab1-3").map(|r| r.key), Some("vocab1-3".to_string()));
        assert!(coordinator.get_record("vocab1-4").is_none());
        assert_eq!(state.ratings.get(&RowId::from("3")), Some(&4));
        assert!(!state.ratings.contains_key(&RowId::from("4")));
    }
}
