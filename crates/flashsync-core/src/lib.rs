//! # Flashsync Core
//!
//! Local-first synchronization of per-row star ratings and per-dataset view
//! settings against a remote whole-document JSON store.
//!
//! ## Architecture
//!
//! ```text
//! Session ──► SyncCoordinator ──► RequestQueue ──► DocumentStore
//!    │              │
//!    ▼              ▼
//! LocalStateStore  RecordCache
//! ```
//!
//! - [`RecordCache`] holds the last known value of every record with a dirty flag
//! - [`SyncCoordinator`] runs the bulk fetch and the optimistic upsert protocol
//! - [`Session`] ties one dataset's local state to the coordinator

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod local;
pub mod record;
pub mod session;

pub use cache::{CacheEntry, CacheStats, RecordCache};
pub use config::{RetryPolicy, SyncConfig};
pub use coordinator::{
    BulkSync, ResyncReport, RestoredState, SyncCoordinator, SyncStatus, UpsertOptions, UpsertOutcome,
};
pub use error::{LocalStateError, SyncError};
pub use key::{DatasetNamespace, RowId};
pub use local::{JsonFileStateStore, LocalState, LocalStateStore, MemoryStateStore, ViewSettings};
pub use record::{is_data_equal, FilterLevel, SyncRecord};
pub use session::{LoadReport, RatingOutcome, Session};

/// Version of the flashsync-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
