//! Error types for synchronization and local persistence

use flashsync_queue::{ConfigError, QueueError};
use flashsync_store::StoreError;
use std::path::PathBuf;

/// Errors surfaced by the coordinator and sessions
///
/// Remote failures during rating or settings changes are absorbed and show
/// up as an unsuccessful outcome instead; these variants cover invalid input,
/// local persistence and configuration.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Rating outside 0-5
    #[error("invalid star rating {0}: expected 0-5")]
    InvalidStars(u8),

    /// View position outside the 1-based row range
    #[error("invalid view position {0}: rows are numbered from 1")]
    InvalidRow(u32),

    /// Remote store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Queue gave up on a remote operation
    #[error(transparent)]
    Queue(#[from] QueueError<StoreError>),

    /// Record could not be encoded for the remote document
    #[error("failed to encode record {key}: {source}")]
    Encode {
        /// Record key
        key: String,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Local state could not be read or written
    #[error(transparent)]
    LocalState(#[from] LocalStateError),

    /// Queue limits are unusable
    #[error("invalid queue configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the durable local state store
#[derive(Debug, thiserror::Error)]
pub enum LocalStateError {
    /// Filesystem failure
    #[error("local state I/O failed for {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Stored state is not valid JSON of the expected shape
    #[error("local state at {path} is corrupt: {source}")]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

impl LocalStateError {
    /// Path the failure relates to
    #[inline]
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::Corrupt { path, .. } => path,
        }
    }
}
