//! # Flashsync Proxy
//!
//! Origin-checked HTTP front for the whole-document JSON store.
//!
//! Browsers cannot hold the upstream credential, so the proxy injects it and
//! only serves origins on its allow-list. Besides the fetch and replace
//! pass-through it offers a single-key upsert, merged server-side under one
//! write lock.
//!
//! ```text
//! browser ──CORS──► flashsync-proxy ──X-Master-Key──► JSON-bin upstream
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod server;

pub use config::{ProxyConfig, DEFAULT_ALLOWED_ORIGINS};
pub use error::{ProxyError, Result};
pub use server::{bind, routes, ProxyState};
