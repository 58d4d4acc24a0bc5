//! Rate-limited request queue
//!
//! Admission of a pending operation requires all of:
//! - fewer than `max_concurrent` operations in flight
//! - fewer than `max_per_window` dispatches in the trailing window
//! - at least `min_interval` since the previous dispatch
//!
//! A single dispatcher task drains the queue while it is non-empty and exits
//! when it runs dry; the next `enqueue` (or a re-queued retry) starts a new one.
//! Each dispatched attempt runs on its own task under a hard timeout.

use crate::config::QueueConfig;
use crate::error::{Classify, ConfigError, FailureKind, QueueError};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep, Instant};

type Reply<T, E> = Arc<Mutex<Option<oneshot::Sender<Result<T, QueueError<E>>>>>>;

/// Type-erased, re-runnable operation with its reply channel
trait Attempt<E>: Send {
    /// Start one attempt; delivers the value to the caller on success
    fn run(&self) -> BoxFuture<'static, Result<(), E>>;

    /// Settle the caller with a final error
    fn reject(self: Box<Self>, error: QueueError<E>);
}

struct TypedAttempt<F, T, E> {
    operation: F,
    reply: Reply<T, E>,
}

impl<F, Fut, T, E> Attempt<E> for TypedAttempt<F, T, E>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn run(&self) -> BoxFuture<'static, Result<(), E>> {
        let reply = Arc::clone(&self.reply);
        let pending = (self.operation)();
        Box::pin(async move {
            let value = pending.await?;
            let sender = reply.lock().take();
            if let Some(tx) = sender {
                let _ = tx.send(Ok(value));
            }
            Ok(())
        })
    }

    fn reject(self: Box<Self>, error: QueueError<E>) {
        let sender = self.reply.lock().take();
        if let Some(tx) = sender {
            let _ = tx.send(Err(error));
        }
    }
}

struct Job<E> {
    id: u64,
    retries: u32,
    attempt: Box<dyn Attempt<E>>,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Operations waiting for admission
    pub pending: usize,
    /// Whether a dispatcher task is running
    pub processing: bool,
    /// Operations currently executing
    pub in_flight: usize,
    /// Dispatches inside the current rolling window
    pub dispatches_in_window: usize,
    /// Whether an operation could be dispatched right now
    pub can_dispatch: bool,
    /// Dispatches since the queue was created
    pub total_dispatched: u64,
}

enum Admission {
    Ready,
    WaitFor(Duration),
    Saturated,
}

enum Step<E> {
    Dispatch(Job<E>),
    Sleep(Duration),
    Park,
}

struct QueueState<E> {
    pending: VecDeque<Job<E>>,
    processing: bool,
    in_flight: usize,
    last_dispatch: Option<Instant>,
    dispatches: VecDeque<Instant>,
    total_dispatched: u64,
    next_id: u64,
}

impl<E> QueueState<E> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            processing: false,
            in_flight: 0,
            last_dispatch: None,
            dispatches: VecDeque::new(),
            total_dispatched: 0,
            next_id: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.dispatches.front() {
            if now.duration_since(oldest) < window {
                break;
            }
            self.dispatches.pop_front();
        }
    }

    fn admission(&mut self, now: Instant, config: &QueueConfig) -> Admission {
        self.prune(now, config.window());

        if self.in_flight >= config.max_concurrent {
            return Admission::Saturated;
        }

        if self.dispatches.len() >= config.max_per_window {
            if let Some(&oldest) = self.dispatches.front() {
                return Admission::WaitFor((oldest + config.window()).saturating_duration_since(now));
            }
        }

        if let Some(last) = self.last_dispatch {
            let elapsed = now.duration_since(last);
            if elapsed < config.min_interval() {
                return Admission::WaitFor(config.min_interval() - elapsed);
            }
        }

        Admission::Ready
    }

    fn record_dispatch(&mut self, now: Instant) {
        self.in_flight += 1;
        self.last_dispatch = Some(now);
        self.dispatches.push_back(now);
        self.total_dispatched += 1;
    }
}

struct Shared<E> {
    config: QueueConfig,
    state: Mutex<QueueState<E>>,
    wake: Notify,
}

/// Serializing, rate-limited executor for remote operations
///
/// Cloning is cheap; clones share the same queue and limits. Operations are
/// dispatched FIFO, except that retries re-enter at the head so a caller's
/// request keeps its priority over newer work.
pub struct RequestQueue<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for RequestQueue<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for RequestQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RequestQueue")
            .field("config", &self.shared.config)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .finish()
    }
}

impl<E> RequestQueue<E>
where
    E: Classify + Send + 'static,
{
    /// Create a queue with the given limits
    ///
    /// Limits are not checked here; a zero concurrency limit parks every
    /// operation forever. Use [`RequestQueue::try_new`] for untrusted config.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "invalid queue config: {config:?}");
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(QueueState::new()),
                wake: Notify::new(),
            }),
        }
    }

    /// Create a queue after validating `config`
    ///
    /// # Errors
    /// - `ConfigError` if a limit is zero or the backoff range is inverted
    pub fn try_new(config: QueueConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Limits this queue enforces
    #[inline]
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Queue an operation
    ///
    /// The operation is registered immediately (before the returned future is
    /// polled), so call order is queue order. It may be invoked more than once
    /// when retried. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `QueueError::Failed` for a non-retryable failure
    /// - `QueueError::RetriesExhausted` when retryable failures outlast `max_retries`
    /// - `QueueError::TimedOut` when every attempt hit the timeout
    pub fn enqueue<T, F, Fut>(&self, operation: F) -> impl Future<Output = Result<T, QueueError<E>>> + Send + 'static
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let attempt = TypedAttempt {
            operation,
            reply: Arc::new(Mutex::new(Some(tx))),
        };

        let id = {
            let mut state = self.shared.state.lock();
            state.next_id += 1;
            state.next_id
        };
        tracing::trace!(job = id, "operation queued");

        push(
            &self.shared,
            Job {
                id,
                retries: 0,
                attempt: Box::new(attempt),
            },
            false,
        );

        async move { rx.await.unwrap_or(Err(QueueError::Dropped)) }
    }

    /// Snapshot of queue occupancy and rate state
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let mut state = self.shared.state.lock();
        let can_dispatch = matches!(
            state.admission(Instant::now(), &self.shared.config),
            Admission::Ready
        );
        QueueStatus {
            pending: state.pending.len(),
            processing: state.processing,
            in_flight: state.in_flight,
            dispatches_in_window: state.dispatches.len(),
            can_dispatch,
            total_dispatched: state.total_dispatched,
        }
    }
}

fn push<E>(shared: &Arc<Shared<E>>, job: Job<E>, front: bool)
where
    E: Classify + Send + 'static,
{
    let start = {
        let mut state = shared.state.lock();
        if front {
            state.pending.push_front(job);
        } else {
            state.pending.push_back(job);
        }
        let start = !state.processing;
        state.processing = true;
        start
    };

    if start {
        tokio::spawn(process(Arc::clone(shared)));
    } else {
        shared.wake.notify_one();
    }
}

async fn process<E>(shared: Arc<Shared<E>>)
where
    E: Classify + Send + 'static,
{
    loop {
        let step = {
            let mut state = shared.state.lock();
            if state.pending.is_empty() {
                state.processing = false;
                return;
            }
            let now = Instant::now();
            match state.admission(now, &shared.config) {
                Admission::Ready => match state.pending.pop_front() {
                    Some(job) => {
                        state.record_dispatch(now);
                        Step::Dispatch(job)
                    }
                    None => {
                        state.processing = false;
                        return;
                    }
                },
                Admission::WaitFor(wait) => Step::Sleep(wait),
                Admission::Saturated => Step::Park,
            }
        };

        match step {
            Step::Dispatch(job) => {
                tracing::debug!(job = job.id, attempt = job.retries + 1, "dispatching");
                tokio::spawn(execute(Arc::clone(&shared), job));
            }
            Step::Sleep(wait) => {
                tracing::trace!(?wait, "rate limited, waiting");
                sleep(wait).await;
            }
            Step::Park => shared.wake.notified().await,
        }
    }
}

/// In-flight slot of one dispatched attempt, freed on drop
struct Slot<'a, E> {
    shared: &'a Shared<E>,
}

impl<E> Drop for Slot<'_, E> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.shared.wake.notify_one();
    }
}

async fn execute<E>(shared: Arc<Shared<E>>, mut job: Job<E>)
where
    E: Classify + Send + 'static,
{
    let outcome = {
        let _slot = Slot { shared: &shared };
        match panic::catch_unwind(AssertUnwindSafe(|| job.attempt.run())) {
            Ok(attempt) => {
                AssertUnwindSafe(tokio::time::timeout(shared.config.timeout(), attempt))
                    .catch_unwind()
                    .await
            }
            Err(payload) => Err(payload),
        }
    };

    let Ok(outcome) = outcome else {
        tracing::error!(job = job.id, "operation panicked");
        job.attempt.reject(QueueError::Dropped);
        return;
    };

    let error = match outcome {
        Ok(Ok(())) => {
            tracing::trace!(job = job.id, "operation completed");
            return;
        }
        Ok(Err(error)) => Some(error),
        Err(_elapsed) => None,
    };

    let kind = error.as_ref().map_or(FailureKind::Timeout, Classify::failure_kind);
    let attempts = job.retries + 1;
    let can_retry = job.retries < shared.config.max_retries;

    match (kind, can_retry) {
        (FailureKind::RateLimited, true) => {
            job.retries += 1;
            let backoff = shared.config.sample_backoff();
            tracing::warn!(
                job = job.id,
                retry = job.retries,
                max_retries = shared.config.max_retries,
                ?backoff,
                "rate limited, backing off"
            );
            sleep(backoff).await;
            push(&shared, job, true);
        }
        (FailureKind::Timeout, true) => {
            job.retries += 1;
            tracing::warn!(
                job = job.id,
                retry = job.retries,
                max_retries = shared.config.max_retries,
                "attempt timed out, retrying"
            );
            push(&shared, job, true);
        }
        (FailureKind::RateLimited | FailureKind::Timeout, false) => {
            tracing::error!(job = job.id, attempts, "retry budget exhausted");
            let final_error = match error {
                Some(last) => QueueError::RetriesExhausted { attempts, last },
                None => QueueError::TimedOut { attempts },
            };
            job.attempt.reject(final_error);
        }
        (FailureKind::Fatal, _) => {
            tracing::error!(job = job.id, "operation failed, not retrying");
            let final_error = match error {
                Some(e) => QueueError::Failed(e),
                None => QueueError::TimedOut { attempts },
            };
            job.attempt.reject(final_error);
        }
    }
}
