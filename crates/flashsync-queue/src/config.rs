//! Queue limits
//!
//! Durations are carried as milliseconds so the config round-trips through
//! TOML/JSON without custom serializers.

use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied by [`RequestQueue`](crate::RequestQueue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum operations in flight at once
    pub max_concurrent: usize,
    /// Minimum spacing between two dispatches
    pub min_interval_ms: u64,
    /// Maximum dispatches inside one rolling window
    pub max_per_window: usize,
    /// Length of the rolling rate window
    pub window_ms: u64,
    /// Hard timeout for a single attempt
    pub timeout_ms: u64,
    /// Retries granted to rate-limited or timed-out operations
    pub max_retries: u32,
    /// Lower bound of the rate-limit backoff
    pub backoff_min_ms: u64,
    /// Upper bound (exclusive) of the rate-limit backoff
    pub backoff_max_ms: u64,
}

impl QueueConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max in-flight operations
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// With minimum dispatch spacing
    #[inline]
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_ms = duration_ms(interval);
        self
    }

    /// With rolling-window rate limit
    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, max_per_window: usize, window: Duration) -> Self {
        self.max_per_window = max_per_window;
        self.window_ms = duration_ms(window);
        self
    }

    /// With per-attempt timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// With rate-limit backoff range
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min_ms = duration_ms(min);
        self.backoff_max_ms = duration_ms(max);
        self
    }

    /// Minimum spacing between dispatches
    #[inline]
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Rolling window length
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Per-attempt timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Draw a rate-limit backoff uniformly from `[backoff_min, backoff_max)`
    #[must_use]
    pub fn sample_backoff(&self) -> Duration {
        if self.backoff_max_ms <= self.backoff_min_ms {
            return Duration::from_millis(self.backoff_min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.backoff_min_ms..self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// Check that every limit is usable
    ///
    /// # Errors
    /// - `ConfigError::ZeroLimit` if a concurrency or rate limit is zero
    /// - `ConfigError::InvertedBackoff` if the backoff range is inverted
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroLimit("max_concurrent"));
        }
        if self.max_per_window == 0 {
            return Err(ConfigError::ZeroLimit("max_per_window"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit("timeout_ms"));
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(ConfigError::InvertedBackoff {
                min_ms: self.backoff_min_ms,
                max_ms: self.backoff_max_ms,
            });
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval_ms: 150,
            max_per_window: 5,
            window_ms: 60_000,
            timeout_ms: 5_000,
            max_retries: 2,
            backoff_min_ms: 3_000,
            backoff_max_ms: 6_000,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_remote_budget() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.min_interval(), Duration::from_millis(150));
        assert_eq!(config.max_per_window, 5);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_stays_in_range() {
        let config = QueueConfig::default();
        for _ in 0..200 {
            let backoff = config.sample_backoff();
            assert!(backoff >= Duration::from_millis(3_000));
            assert!(backoff < Duration::from_millis(6_000));
        }
    }

    #[test]
    fn degenerate_backoff_range_is_fixed() {
        let config = QueueConfig::new().with_backoff(Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(config.sample_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn validate_rejects_bad_limits() {
        assert_eq!(
            QueueConfig::new().with_max_concurrent(0).validate(),
            Err(ConfigError::ZeroLimit("max_concurrent"))
        );
        let inverted = QueueConfig::new().with_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(inverted.validate(), Err(ConfigError::InvertedBackoff { .. })));
    }

    #[test]
    fn partial_input_fills_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"max_concurrent": 4}"#).unwrap();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_per_window, 5);
        assert_eq!(config.backoff_max_ms, 6_000);
    }
}
