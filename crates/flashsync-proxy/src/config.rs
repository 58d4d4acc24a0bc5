//! Proxy configuration

use crate::error::{ProxyError, Result};
use flashsync_store::{HttpDocumentStore, HttpStoreConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Origins accepted by default
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8000",
    "http://localhost:3000",
    "http://127.0.0.1:8000",
];

/// Listener and CORS settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address to listen on
    pub listen: SocketAddr,
    /// Browser origins allowed to call the proxy
    pub allowed_origins: Vec<String>,
    /// Accept requests that carry no `Origin` header (non-browser clients)
    pub allow_missing_origin: bool,
    /// Upstream JSON-bin API base
    pub upstream_base: String,
    /// Upstream bin holding the document
    pub bin_id: String,
    /// Upstream credential, injected as a header on every upstream call
    pub master_key: String,
    /// Upstream request timeout
    pub upstream_timeout_ms: u64,
}

impl ProxyConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// With allowed origins, replacing the defaults
    #[must_use]
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// With missing-origin policy
    #[inline]
    #[must_use]
    pub fn with_allow_missing_origin(mut self, allow: bool) -> Self {
        self.allow_missing_origin = allow;
        self
    }

    /// With upstream bin and credential
    #[must_use]
    pub fn with_upstream(mut self, base: impl Into<String>, bin_id: impl Into<String>, master_key: impl Into<String>) -> Self {
        self.upstream_base = base.into();
        self.bin_id = bin_id.into();
        self.master_key = master_key.into();
        self
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// - `ProxyError::Config` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| ProxyError::Config(format!("{}: {e}", path.display())))
    }

    /// HTTP store for the configured upstream bin
    ///
    /// # Errors
    /// - `ProxyError::Config` when the bin id or master key is missing
    /// - `ProxyError::Store` when the client cannot be built
    pub fn upstream_store(&self) -> Result<HttpDocumentStore> {
        if self.bin_id.is_empty() {
            return Err(ProxyError::Config("upstream bin id is not set".into()));
        }
        if self.master_key.is_empty() {
            return Err(ProxyError::Config("upstream master key is not set".into()));
        }
        let config = HttpStoreConfig::for_jsonbin(&self.upstream_base, &self.bin_id, &self.master_key)
            .with_request_timeout(Duration::from_millis(self.upstream_timeout_ms));
        Ok(HttpDocumentStore::new(config)?)
    }

    /// Whether a request from `origin` may be served
    #[must_use]
    pub fn admits(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|allowed| allowed == origin),
            None => self.allow_missing_origin,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| (*s).to_string()).collect(),
            allow_missing_origin: true,
            upstream_base: "https://api.jsonbin.io/v3".to_string(),
            bin_id: String::new(),
            master_key: String::new(),
            upstream_timeout_ms: 10_000,
        }
    }
}

// The credential never reaches logs.
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("listen", &self.listen)
            .field("allowed_origins", &self.allowed_origins)
            .field("allow_missing_origin", &self.allow_missing_origin)
            .field("upstream_base", &self.upstream_base)
            .field("bin_id", &self.bin_id)
            .field("master_key", &"<redacted>")
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .finish()
    }
}
