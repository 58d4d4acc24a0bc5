//! Store trait
//!
//! The remote store offers two primitives: fetch the whole document and
//! replace the whole document. Writing a single key is built on top of them
//! unless a backend can do it natively.

use crate::document::Document;
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Remote whole-document JSON store
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch the current document
    ///
    /// # Errors
    /// Transport, status or decoding failures
    async fn fetch_document(&self) -> Result<Document, StoreError>;

    /// Replace the entire document
    ///
    /// # Errors
    /// Transport or status failures
    async fn replace_document(&self, document: &Document) -> Result<(), StoreError>;

    /// Write one record, preserving every other key
    ///
    /// Returns the record as the store now holds it. The default
    /// implementation fetches, merges and replaces; two concurrent calls for
    /// different keys can therefore overwrite each other.
    ///
    /// # Errors
    /// Any failure of the underlying fetch or replace
    async fn upsert_key(&self, key: &str, record: Value) -> Result<Value, StoreError> {
        merge_and_replace(self, key, record).await
    }
}

/// Fetch, merge `record` under `key`, then replace
///
/// # Errors
/// Any failure of the underlying fetch or replace
pub async fn merge_and_replace<S>(store: &S, key: &str, record: Value) -> Result<Value, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let mut document = store.fetch_document().await?;
    document.insert(key, record.clone());
    store.replace_document(&document).await?;
    tracing::debug!(key, records = document.len(), "Merged record into remote document");
    Ok(record)
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn fetch_document(&self) -> Result<Document, StoreError> {
        (**self).fetch_document().await
    }

    async fn replace_document(&self, document: &Document) -> Result<(), StoreError> {
        (**self).replace_document(document).await
    }

    async fn upsert_key(&self, key: &str, record: Value) -> Result<Value, StoreError> {
        (**self).upsert_key(key, record).await
    }
}
