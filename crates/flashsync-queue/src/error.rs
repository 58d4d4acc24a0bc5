//! Error types for the request queue
//!
//! The queue never inspects operation errors directly. Operations report
//! their failures through [`Classify`], and the queue decides between
//! re-queueing and rejecting based on the returned [`FailureKind`].

/// How a failed operation is treated by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Remote signalled rate limiting (HTTP 429); retried after a random backoff
    RateLimited,
    /// Operation did not finish in time; retried immediately
    Timeout,
    /// Anything else; rejected without retry
    Fatal,
}

/// Classification hook implemented by operation error types
pub trait Classify {
    /// Map this error to the queue's retry policy
    fn failure_kind(&self) -> FailureKind;
}

/// Final outcome of an operation that did not succeed
#[derive(Debug, thiserror::Error)]
pub enum QueueError<E> {
    /// Non-retryable failure, surfaced on first occurrence
    #[error("operation failed: {0}")]
    Failed(E),

    /// Retryable failure that persisted past the retry budget
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made (initial + retries)
        attempts: u32,
        /// Error returned by the last attempt
        last: E,
    },

    /// The per-operation timer fired on every attempt
    #[error("operation timed out after {attempts} attempts")]
    TimedOut {
        /// Total attempts made (initial + retries)
        attempts: u32,
    },

    /// The operation panicked or was dropped without being settled
    #[error("request queue dropped the operation")]
    Dropped,
}

impl<E> QueueError<E> {
    /// Error reported by the operation itself, if any
    #[inline]
    #[must_use]
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) | Self::RetriesExhausted { last: e, .. } => Some(e),
            Self::TimedOut { .. } | Self::Dropped => None,
        }
    }

    /// Number of attempts made before giving up, when known
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Failed(_) => Some(1),
            Self::RetriesExhausted { attempts, .. } | Self::TimedOut { attempts } => Some(*attempts),
            Self::Dropped => None,
        }
    }

    /// Whether the queue's own timer produced this error
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Invalid queue configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A limit that must be positive was zero
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// Backoff range is inverted
    #[error("backoff range is inverted: {min_ms}ms > {max_ms}ms")]
    InvertedBackoff {
        /// Lower bound in milliseconds
        min_ms: u64,
        /// Upper bound in milliseconds
        max_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    #[test]
    fn attempts_reported_per_variant() {
        assert_eq!(QueueError::Failed(Boom).attempts(), Some(1));
        assert_eq!(
            QueueError::RetriesExhausted { attempts: 3, last: Boom }.attempts(),
            Some(3)
        );
        assert_eq!(QueueError::<Boom>::TimedOut { attempts: 2 }.attempts(), Some(2));
        assert_eq!(QueueError::<Boom>::Dropped.attempts(), None);
    }

    #[test]
    fn display_includes_last_error() {
        let err = QueueError::RetriesExhausted { attempts: 3, last: Boom };
        assert_eq!(err.to_string(), "gave up after 3 attempts: boom");
        assert!(err.operation_error().is_some());
        assert!(!err.is_timeout());
    }
}
