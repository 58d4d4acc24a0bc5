//! Error types for remote store access
//!
//! HTTP status codes are preserved so callers can tell rate limiting and
//! server faults (worth retrying) apart from client errors (not worth it).

use flashsync_queue::{Classify, FailureKind};

/// Failure talking to the remote document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Remote answered 429
    #[error("remote store is rate limiting requests (429)")]
    RateLimited,

    /// No response in time
    #[error("remote store did not respond in time")]
    Timeout,

    /// Remote answered with a 5xx status
    #[error("remote store failed with status {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Remote answered with any other non-success status
    #[error("remote store rejected the request with status {status}: {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body was not a usable document
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Transport failure with no HTTP status
    #[error("network unavailable: {0}")]
    Network(String),

    /// Adapter could not be constructed from its configuration
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            500.. => Self::Server {
                status,
                message: message.into(),
            },
            _ => Self::Client {
                status,
                message: message.into(),
            },
        }
    }

    /// HTTP status behind this error, if there was one
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::Timeout | Self::Malformed(_) | Self::Network(_) | Self::InvalidConfig(_) => None,
        }
    }

    /// Whether a later attempt could plausibly succeed (429 or 5xx)
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Server { .. })
    }
}

impl Classify for StoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimited => FailureKind::RateLimited,
            Self::Timeout => FailureKind::Timeout,
            _ => FailureKind::Fatal,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        Self::Network(err.to_string())
    }
}
