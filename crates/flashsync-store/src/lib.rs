//! # Flashsync Store
//!
//! Adapter for the remote whole-document JSON store.
//!
//! The store exposes a single JSON object mapping record keys to records.
//! Only two primitives exist remotely, fetch-all and replace-all; writing one
//! key is a read-merge-write built on top of them unless a backend (such as
//! the forwarding proxy) offers it natively.
//!
//! ## Backends
//!
//! - [`HttpDocumentStore`]: the proxy or a JSON-bin style API over HTTP
//! - [`MemoryDocumentStore`]: in-process, for offline use and tests

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod document;
pub mod error;
pub mod http;
pub mod memory;

pub use adapter::{merge_and_replace, DocumentStore};
pub use document::Document;
pub use error::StoreError;
pub use http::{HttpDocumentStore, HttpStoreConfig, MASTER_KEY_HEADER};
pub use memory::MemoryDocumentStore;
