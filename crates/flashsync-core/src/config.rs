//! Coordinator configuration
//!
//! Serde-friendly so the CLI can read it from TOML. Every section has
//! defaults; a config file only needs to name what it changes.

use crate::error::SyncError;
use flashsync_queue::QueueConfig;
use flashsync_store::{HttpStoreConfig, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upsert-level retry schedule
///
/// Runs on top of the queue's own retries: once the queue gives up on a
/// write that ended in 429 or 5xx, the coordinator waits and enqueues it
/// again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Create default policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// With base and cap of the exponential delay
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self.max_delay_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before retry number `retry` (1-based): base doubled per retry, capped
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63);
        let ms = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Whether a write that failed with `error` is worth another attempt
    #[inline]
    #[must_use]
    pub fn should_retry(&self, error: Option<&StoreError>, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries && error.is_some_and(StoreError::is_retryable)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
        }
    }
}

/// Everything needed to build a coordinator and its local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the forwarding proxy
    pub proxy_url: Option<String>,
    /// Explicit remote endpoints; takes precedence over `proxy_url`
    pub store: Option<HttpStoreConfig>,
    /// Request queue limits
    pub queue: QueueConfig,
    /// Upsert retry schedule
    pub retry: RetryPolicy,
    /// Directory holding per-dataset local state
    pub state_dir: PathBuf,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With proxy base URL
    #[inline]
    #[must_use]
    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// With queue limits
    #[inline]
    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// With upsert retry schedule
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With local state directory
    #[inline]
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Remote endpoints, if any are configured
    #[must_use]
    pub fn http_store(&self) -> Option<HttpStoreConfig> {
        self.store
            .clone()
            .or_else(|| self.proxy_url.as_deref().map(HttpStoreConfig::for_proxy))
    }

    /// Check queue limits
    ///
    /// # Errors
    /// - `SyncError::Config` if the queue configuration is unusable
    pub fn validate(&self) -> Result<(), SyncError> {
        self.queue.validate()?;
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            store: None,
            queue: QueueConfig::default(),
            retry: RetryPolicy::default(),
            state_dir: PathBuf::from(".flashsync"),
        }
    }
}
