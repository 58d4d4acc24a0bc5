//! Dataset sessions
//!
//! A session is one loaded dataset: its namespace, its locally persisted
//! ratings and view preferences, and the coordinator that syncs them. Local
//! state is written before every remote write, so a failed sync never loses
//! a rating.

use crate::coordinator::{BulkSync, RestoredState, SyncCoordinator, SyncStatus, UpsertOptions, UpsertOutcome};
use crate::error::SyncError;
use crate::key::{DatasetNamespace, RowId};
use crate::local::{LocalState, LocalStateStore, ViewSettings};
use crate::record::{FilterLevel, SyncRecord, MAX_STARS};
use flashsync_store::DocumentStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// How a dataset load went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Local state existed for the dataset
    pub local_state_found: bool,
    /// Remote document was reachable (or already cached)
    pub remote_available: bool,
    /// Whole remote document was fetched during this load
    pub fetched: bool,
    /// Local ratings changed to match the remote
    pub ratings_restored: usize,
    /// View preferences changed to match the remote
    pub settings_restored: bool,
}

/// Result of a rating change
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    /// Key of the item record
    pub key: String,
    /// Remote write outcome
    pub upsert: UpsertOutcome,
    /// Sync state of the row after the call
    pub status: SyncStatus,
}

/// One loaded dataset
pub struct Session<S, L> {
    coordinator: SyncCoordinator<S>,
    local: Arc<L>,
    dataset: String,
    namespace: DatasetNamespace,
    rows: Option<BTreeSet<RowId>>,
    state: LocalState,
}

impl<S, L> std::fmt::Debug for Session<S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dataset", &self.dataset)
            .field("namespace", &self.namespace)
            .field("ratings", &self.state.ratings.len())
            .field("view", &self.state.view)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore, L: LocalStateStore> Session<S, L> {
    /// Load a dataset
    ///
    /// Reads local state first, then runs the bulk sync and takes remote
    /// ratings and settings over local ones. With `rows` given, only ratings
    /// for those rows are restored; `None` accepts every row found remotely.
    /// Unreadable local state is logged and replaced.
    pub async fn load(
        coordinator: SyncCoordinator<S>,
        local: Arc<L>,
        dataset: impl Into<String>,
        rows: Option<BTreeSet<RowId>>,
    ) -> (Self, LoadReport) {
        let dataset = dataset.into();
        let namespace = DatasetNamespace::from_dataset_name(&dataset);
        let mut report = LoadReport::default();

        let state = match local.load(&dataset).await {
            Ok(Some(state)) => {
                report.local_state_found = true;
                state
            }
            Ok(None) => LocalState::default(),
            Err(error) => {
                tracing::warn!(dataset = %dataset, error = %error, "Ignoring unreadable local state");
                LocalState::default()
            }
        };

        let mut session = Self {
            coordinator,
            local,
            dataset,
            namespace,
            rows,
            state,
        };

        let restored = match session.coordinator.bulk_sync_from_remote(&session.namespace).await {
            BulkSync::Restored { state, .. } => {
                report.fetched = true;
                Some(state)
            }
            BulkSync::Skipped => Some(session.coordinator.restored_state(&session.namespace)),
            BulkSync::Unavailable => None,
        };

        if let Some(restored) = restored {
            report.remote_available = true;
            session.apply_restored(&restored, &mut report);
            if report.ratings_restored > 0 || report.settings_restored {
                if let Err(error) = session.persist().await {
                    tracing::warn!(dataset = %session.dataset, error = %error, "Restored state not saved locally");
                }
            }
        }

        tracing::info!(
            dataset = %session.dataset,
            namespace = %session.namespace,
            ratings = session.state.ratings.len(),
            restored = report.ratings_restored,
            remote = report.remote_available,
            "Dataset loaded"
        );
        (session, report)
    }

    fn apply_restored(&mut self, restored: &RestoredState, report: &mut LoadReport) {
        if let Some(settings) = &restored.settings {
            report.settings_restored = self.state.view.apply_record(settings);
        }
        for (row, stars) in &restored.ratings {
            if self.rows.as_ref().is_some_and(|rows| !rows.contains(row)) {
                continue;
            }
            let previous = self.state.ratings.insert(row.as_str().to_string(), *stars);
            if previous != Some(*stars) {
                report.ratings_restored += 1;
            }
        }
    }

    async fn persist(&self) -> Result<(), SyncError> {
        self.local.save(&self.dataset, &self.state).await?;
        Ok(())
    }

    /// Rate a row
    ///
    /// Updates and persists local state, then writes the row's record
    /// remotely. A failed remote write is reported in the outcome, not as an
    /// error.
    ///
    /// # Errors
    /// - `SyncError::InvalidStars` if `stars` exceeds 5
    /// - `SyncError::LocalState` if local state cannot be saved
    pub async fn set_rating(&mut self, row: &RowId, stars: u8) -> Result<RatingOutcome, SyncError> {
        if stars > MAX_STARS {
            return Err(SyncError::InvalidStars(stars));
        }
        self.state.ratings.insert(row.as_str().to_string(), stars);
        self.persist().await?;

        let key = self.namespace.item_key(row);
        let record = match self.coordinator.get_record(&key) {
            Some(existing) => existing.with_stars(stars),
            None => SyncRecord::new_item(&key, stars),
        }
        .touched();

        let upsert = self
            .coordinator
            .upsert_record(&key, record, UpsertOptions::default())
            .await;
        let status = self.coordinator.sync_status(&key);
        Ok(RatingOutcome { key, upsert, status })
    }

    /// Change the star filter
    ///
    /// # Errors
    /// - `SyncError::LocalState` if local state cannot be saved
    pub async fn set_filter_level(&mut self, level: FilterLevel) -> Result<UpsertOutcome, SyncError> {
        self.state.view.filter_level = level;
        self.persist().await?;
        Ok(self.update_settings(|record| record.with_filter_level(level)).await)
    }

    /// Turn rating-ordered sorting on or off
    ///
    /// # Errors
    /// - `SyncError::LocalState` if local state cannot be saved
    pub async fn set_sort_by_stars(&mut self, sort: bool) -> Result<UpsertOutcome, SyncError> {
        self.state.view.sort_by_stars = sort;
        self.persist().await?;
        Ok(self.update_settings(|record| record.with_sort_by_stars(sort)).await)
    }

    /// Remember the row last shown
    ///
    /// # Errors
    /// - `SyncError::InvalidRow` if `row` is zero
    /// - `SyncError::LocalState` if local state cannot be saved
    pub async fn save_view_position(&mut self, row: u32) -> Result<UpsertOutcome, SyncError> {
        if row == 0 {
            return Err(SyncError::InvalidRow(row));
        }
        self.state.view.last_viewed_row = Some(row);
        self.persist().await?;
        self.coordinator
            .save_view_position(&self.namespace, row, &self.state.view)
            .await
    }

    // Settings writes start from the cached record so fields this session
    // does not manage (such as the view position) survive.
    async fn update_settings(&self, change: impl FnOnce(SyncRecord) -> SyncRecord) -> UpsertOutcome {
        let key = self.namespace.settings_key();
        let base = self
            .coordinator
            .get_record(&key)
            .unwrap_or_else(|| self.state.view.to_settings_record(&key));
        let record = change(base).touched();
        self.coordinator
            .upsert_record(&key, record, UpsertOptions::default())
            .await
    }

    /// Local rating of `row`
    #[must_use]
    pub fn rating(&self, row: &RowId) -> Option<u8> {
        self.state.ratings.get(row.as_str()).copied()
    }

    /// Every local rating, keyed by row id
    #[inline]
    #[must_use]
    pub fn ratings(&self) -> &BTreeMap<String, u8> {
        &self.state.ratings
    }

    /// Current view preferences
    #[inline]
    #[must_use]
    pub fn view(&self) -> &ViewSettings {
        &self.state.view
    }

    /// Sync state of `row`
    #[must_use]
    pub fn sync_status(&self, row: &RowId) -> SyncStatus {
        self.coordinator.sync_status(&self.namespace.item_key(row))
    }

    /// Dataset name as loaded
    #[inline]
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Namespace derived from the dataset name
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &DatasetNamespace {
        &self.namespace
    }

    /// Coordinator backing this session
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &SyncCoordinator<S> {
        &self.coordinator
    }
}
