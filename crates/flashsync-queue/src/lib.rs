//! flashsync request queue
//!
//! Bounds concurrency and request rate against a remote service and turns
//! transient failures into bounded retries.
//!
//! # Example
//!
//! ```rust,ignore
//! use flashsync_queue::{QueueConfig, RequestQueue};
//!
//! let queue = RequestQueue::<MyError>::new(QueueConfig::default());
//! let body = queue.enqueue(move || fetch(url.clone())).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod queue;

pub use config::QueueConfig;
pub use error::{Classify, ConfigError, FailureKind, QueueError};
pub use queue::{QueueStatus, RequestQueue};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
