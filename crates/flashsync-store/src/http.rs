//! HTTP-backed document store
//!
//! Talks either to the forwarding proxy (`/latest`, `/update`, `/upsert`) or
//! directly to a JSON-bin style endpoint. Credentials travel as configured
//! headers and are never logged.

use crate::adapter::{merge_and_replace, DocumentStore};
use crate::document::{Document, ENVELOPE_FIELD};
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the JSON-bin master key
pub const MASTER_KEY_HEADER: &str = "X-Master-Key";

/// Endpoints and headers for [`HttpDocumentStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpStoreConfig {
    /// URL answering GET with the current document
    pub fetch_url: String,
    /// URL accepting PUT of the whole document
    pub replace_url: String,
    /// URL accepting PUT of `{key, record}`; client-side merge when absent
    #[serde(default)]
    pub upsert_url: Option<String>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Transport-level timeout
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl HttpStoreConfig {
    /// Endpoints exposed by the forwarding proxy at `base_url`
    #[must_use]
    pub fn for_proxy(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            fetch_url: format!("{base}/latest"),
            replace_url: format!("{base}/update"),
            upsert_url: Some(format!("{base}/upsert")),
            headers: BTreeMap::new(),
            request_timeout_ms: None,
        }
    }

    /// Endpoints of a JSON-bin style API for one bin
    #[must_use]
    pub fn for_jsonbin(api_base: &str, bin_id: &str, master_key: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        let mut headers = BTreeMap::new();
        headers.insert(MASTER_KEY_HEADER.to_string(), master_key.to_string());
        Self {
            fetch_url: format!("{base}/b/{bin_id}/latest"),
            replace_url: format!("{base}/b/{bin_id}"),
            upsert_url: None,
            headers,
            request_timeout_ms: None,
        }
    }

    /// With an extra request header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// With a transport-level timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// [`DocumentStore`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    config: HttpStoreConfig,
    headers: HeaderMap,
}

impl HttpDocumentStore {
    /// Build a store from its endpoints
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` for unusable header names/values or a
    ///   client that cannot be constructed
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StoreError::InvalidConfig(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StoreError::InvalidConfig(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            config,
            headers,
        })
    }

    /// Endpoint configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    async fn upsert_remote(&self, url: &str, key: &str, record: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .put(url)
            .headers(self.headers.clone())
            .json(&json!({ "key": key, "record": record }))
            .send()
            .await?;
        let mut body = read_json(response).await?;
        // Servers echo `{key, record}`; anything else means the write landed as sent.
        match body.get_mut(ENVELOPE_FIELD).map(Value::take) {
            Some(stored) if !stored.is_null() => Ok(stored),
            _ => Ok(record),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn fetch_document(&self) -> Result<Document, StoreError> {
        let response = self
            .client
            .get(&self.config.fetch_url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let document = Document::from_body(read_json(response).await?)?;
        tracing::debug!(records = document.len(), "Fetched remote document");
        Ok(document)
    }

    async fn replace_document(&self, document: &Document) -> Result<(), StoreError> {
        let response = self
            .client
            .put(&self.config.replace_url)
            .headers(self.headers.clone())
            .json(document)
            .send()
            .await?;
        read_json(response).await?;
        tracing::debug!(records = document.len(), "Replaced remote document");
        Ok(())
    }

    async fn upsert_key(&self, key: &str, record: Value) -> Result<Value, StoreError> {
        match self.config.upsert_url.as_deref() {
            Some(url) => self.upsert_remote(url, key, record).await,
            None => merge_and_replace(self, key, record).await,
        }
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Remote store returned an error status");
        return Err(StoreError::from_status(status.as_u16(), message));
    }
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn proxy_endpoints() {
        let config = HttpStoreConfig::for_proxy("http://localhost:8787/");
        assert_eq!(config.fetch_url, "http://localhost:8787/latest");
        assert_eq!(config.replace_url, "http://localhost:8787/update");
        assert_eq!(config.upsert_url.as_deref(), Some("http://localhost:8787/upsert"));
    }

    #[test]
    fn jsonbin_endpoints_carry_master_key() {
        let config = HttpStoreConfig::for_jsonbin("https://api.jsonbin.io/v3", "bin123", "secret");
        assert_eq!(config.fetch_url, "https://api.jsonbin.io/v3/b/bin123/latest");
        assert_eq!(config.replace_url, "https://api.jsonbin.io/v3/b/bin123");
        assert_eq!(config.upsert_url, None);
        assert_eq!(config.headers.get(MASTER_KEY_HEADER).map(String::as_str), Some("secret"));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let config = HttpStoreConfig::for_proxy("http://localhost").with_header("bad header", "x");
        assert!(matches!(
            HttpDocumentStore::new(config),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
