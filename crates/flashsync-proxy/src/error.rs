//! Proxy error types

use flashsync_store::StoreError;
use thiserror::Error;
use warp::http::StatusCode;

/// Result alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Failures surfaced to proxy callers
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Backing store call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request body was not a valid upsert
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Proxy could not be configured
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// HTTP status reported to the caller
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            Self::Store(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(StoreError::Server { status, .. } | StoreError::Client { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Store(StoreError::Network(_) | StoreError::Malformed(_)) => StatusCode::BAD_GATEWAY,
            Self::Store(StoreError::InvalidConfig(_)) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_statuses_pass_through() {
        assert_eq!(ProxyError::from(StoreError::from_status(401, "no")).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ProxyError::from(StoreError::from_status(503, "down")).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ProxyError::from(StoreError::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn transport_failures_are_gateway_errors() {
        assert_eq!(ProxyError::from(StoreError::Timeout).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ProxyError::from(StoreError::Network("reset".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    }
}
