//! In-process document store
//!
//! Holds the document behind a lock. Used by the proxy in offline mode and
//! as the backing store for tests.

use crate::adapter::DocumentStore;
use crate::document::Document;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

/// [`DocumentStore`] kept in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    document: RwLock<Document>,
}

impl MemoryDocumentStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `document`
    #[inline]
    #[must_use]
    pub fn with_document(document: Document) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Copy of the current document
    #[must_use]
    pub fn snapshot(&self) -> Document {
        self.document.read().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_document(&self) -> Result<Document, StoreError> {
        Ok(self.snapshot())
    }

    async fn replace_document(&self, document: &Document) -> Result<(), StoreError> {
        *self.document.write() = document.clone();
        Ok(())
    }

    // Merge under one lock so concurrent writers to different keys never
    // lose each other's records.
    async fn upsert_key(&self, key: &str, record: Value) -> Result<Value, StoreError> {
        self.document.write().insert(key, record.clone());
        Ok(record)
    }
}
