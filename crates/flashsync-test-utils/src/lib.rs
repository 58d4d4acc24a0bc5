//! Testing utilities for the flashsync workspace
//!
//! Shared test helpers, fixtures, and a document store with scripted faults.

#![allow(missing_docs)]

use async_trait::async_trait;
use flashsync_queue::QueueConfig;
use flashsync_store::{Document, DocumentStore, MemoryDocumentStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted call does instead of succeeding
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return this error
    Fail(StoreError),
    /// Never complete
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    fetch: VecDeque<Fault>,
    upsert: VecDeque<Fault>,
    upsert_always: Option<StoreError>,
    latency: Duration,
}

/// In-memory [`DocumentStore`] with fault injection and call counters
#[derive(Debug, Default)]
pub struct ScriptedStore {
    inner: MemoryDocumentStore,
    script: Mutex<Script>,
    fetches: AtomicUsize,
    upserts: AtomicUsize,
    replaces: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            inner: MemoryDocumentStore::with_document(document),
            ..Self::default()
        }
    }

    /// Queue a fault for the next unscripted fetch
    pub fn push_fetch_fault(&self, fault: Fault) -> &Self {
        self.script.lock().fetch.push_back(fault);
        self
    }

    /// Queue a fault for the next unscripted upsert
    pub fn push_upsert_fault(&self, fault: Fault) -> &Self {
        self.script.lock().upsert.push_back(fault);
        self
    }

    /// Fail every upsert with `error` until cleared
    pub fn fail_upserts_with(&self, error: StoreError) -> &Self {
        self.script.lock().upsert_always = Some(error);
        self
    }

    /// Drop all scripted faults
    pub fn clear_faults(&self) {
        let mut script = self.script.lock();
        script.fetch.clear();
        script.upsert.clear();
        script.upsert_always = None;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = latency;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    /// Total remote calls of any kind
    pub fn network_calls(&self) -> usize {
        self.fetch_count() + self.upsert_count() + self.replace_count()
    }

    /// Most calls observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Document {
        self.inner.snapshot()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn apply(&self, fault: Option<Fault>, latency: Duration) -> Result<(), StoreError> {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match fault {
            None => Ok(()),
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn fetch_document(&self) -> Result<Document, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();
        let (fault, latency) = {
            let mut script = self.script.lock();
            (script.fetch.pop_front(), script.latency)
        };
        self.apply(fault, latency).await?;
        self.inner.fetch_document().await
    }

    async fn replace_document(&self, document: &Document) -> Result<(), StoreError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_document(document).await
    }

    async fn upsert_key(&self, key: &str, record: Value) -> Result<Value, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();
        let (fault, latency) = {
            let mut script = self.script.lock();
            let fault = script
                .upsert
                .pop_front()
                .or_else(|| script.upsert_always.clone().map(Fault::Fail));
            (fault, script.latency)
        };
        self.apply(fault, latency).await?;
        self.inner.upsert_key(key, record).await
    }
}

/// Document built from `(key, value)` pairs
pub fn document<I, K>(entries: I) -> Document
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Queue limits loose enough that only the behavior under test is visible
pub fn relaxed_queue_config() -> QueueConfig {
    QueueConfig::new()
        .with_min_interval(Duration::ZERO)
        .with_rate_limit(10_000, Duration::from_secs(60))
}

/// Install a test-friendly tracing subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
