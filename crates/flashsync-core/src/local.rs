//! Durable local state
//!
//! Per dataset, the last known ratings and view preferences. Written after
//! every local mutation regardless of whether the remote write succeeds, so
//! it stays the source of truth while the remote is unreachable.

use crate::error::LocalStateError;
use crate::record::{FilterLevel, SyncRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

/// View preferences of one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewSettings {
    /// Active star filter
    pub filter_level: FilterLevel,
    /// Whether rows are ordered by rating
    pub sort_by_stars: bool,
    /// 1-based row last shown
    pub last_viewed_row: Option<u32>,
}

impl ViewSettings {
    /// Settings record carrying these preferences
    #[must_use]
    pub fn to_settings_record(&self, key: &str) -> SyncRecord {
        let mut record = SyncRecord::new_settings(key)
            .with_filter_level(self.filter_level)
            .with_sort_by_stars(self.sort_by_stars);
        record.last_viewed_row = self.last_viewed_row;
        record
    }

    /// Take every preference present in a remote settings record
    ///
    /// Returns whether anything changed.
    pub fn apply_record(&mut self, record: &SyncRecord) -> bool {
        let before = self.clone();
        if let Some(level) = record.filter_level {
            self.filter_level = level;
        }
        if let Some(sort) = record.sort_by_stars {
            self.sort_by_stars = sort;
        }
        if let Some(row) = record.last_viewed_row {
            self.last_viewed_row = Some(row);
        }
        *self != before
    }
}

/// Everything persisted locally for one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalState {
    /// Row id → stars
    pub ratings: BTreeMap<String, u8>,
    /// View preferences
    pub view: ViewSettings,
}

/// Durable per-dataset state storage
#[async_trait]
pub trait LocalStateStore: Send + Sync + 'static {
    /// Load the state saved for `dataset`, if any
    ///
    /// # Errors
    /// I/O failures or unreadable state
    async fn load(&self, dataset: &str) -> Result<Option<LocalState>, LocalStateError>;

    /// Save the state for `dataset`
    ///
    /// # Errors
    /// I/O failures
    async fn save(&self, dataset: &str, state: &LocalState) -> Result<(), LocalStateError>;
}

/// One JSON file per dataset inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    /// Store rooted at `dir` (created on first save)
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the state files
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the state for `dataset`
    ///
    /// The full dataset name is kept, so names sharing a namespace get
    /// separate files.
    #[must_use]
    pub fn path_for(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{}.state.json", file_stem(dataset)))
    }
}

// Injective escape of a dataset name into one path component. Bytes outside
// `[A-Za-z0-9._-]` and a leading dot become `%XX`; the empty name is `%`.
fn file_stem(dataset: &str) -> String {
    if dataset.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(dataset.len());
    for (i, byte) in dataset.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') || (byte == b'.' && i > 0);
        if plain {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "%{byte:02X}");
        }
    }
    stem
}

#[async_trait]
impl LocalStateStore for JsonFileStateStore {
    async fn load(&self, dataset: &str) -> Result<Option<LocalState>, LocalStateError> {
        let path = self.path_for(dataset);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LocalStateError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LocalStateError::Corrupt { path, source })
    }

    async fn save(&self, dataset: &str, state: &LocalState) -> Result<(), LocalStateError> {
        let dir = self.dir.clone();
        let path = self.path_for(dataset);
        let bytes = serde_json::to_vec_pretty(state).map_err(|source| LocalStateError::Corrupt {
            path: path.clone(),
            source,
        })?;

        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
            .await
            .map_err(|e| LocalStateError::Io {
                path: self.dir.clone(),
                source: std::io::Error::other(e),
            })?
    }
}

// Write to a temp file in the same directory, then rename over the target.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), LocalStateError> {
    let io_err = |source| LocalStateError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, LocalState>>,
}

impl MemoryStateStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the state saved for `dataset`
    #[must_use]
    pub fn get(&self, dataset: &str) -> Option<LocalState> {
        self.states.lock().get(dataset).cloned()
    }
}

#[async_trait]
impl LocalStateStore for MemoryStateStore {
    async fn load(&self, dataset: &str) -> Result<Option<LocalState>, LocalStateError> {
        Ok(self.get(dataset))
    }

    async fn save(&self, dataset: &str, state: &LocalState) -> Result<(), LocalStateError> {
        self.states.lock().insert(dataset.to_string(), state.clone());
        Ok(())
    }
}
