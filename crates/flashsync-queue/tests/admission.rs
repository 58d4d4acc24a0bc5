//! Rate, spacing and retry bounds observed from the outside
//!
//! Run with paused tokio time so the 60 s window elapses instantly.

use flashsync_queue::{Classify, FailureKind, QueueConfig, QueueError, RequestQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TooManyRequests;

impl std::fmt::Display for TooManyRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("429 Too Many Requests")
    }
}

impl Classify for TooManyRequests {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::RateLimited
    }
}

async fn dispatch_times(queue: &RequestQueue<TooManyRequests>, count: usize) -> Vec<Instant> {
    let times = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for _ in 0..count {
        let times = Arc::clone(&times);
        waiters.push(queue.enqueue(move || {
            let times = Arc::clone(&times);
            async move {
                times.lock().await.push(Instant::now());
                Ok::<_, TooManyRequests>(())
            }
        }));
    }
    for waiter in waiters {
        waiter.await.unwrap();
    }
    let mut times = times.lock().await.clone();
    times.sort();
    times
}

#[tokio::test(start_paused = true)]
async fn no_more_than_five_dispatches_per_minute() {
    let queue = RequestQueue::new(QueueConfig::default());
    let times = dispatch_times(&queue, 12).await;

    assert_eq!(times.len(), 12);
    for window in times.windows(6) {
        assert!(
            window[5].duration_since(window[0]) >= Duration::from_secs(60),
            "six dispatches inside one minute"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn dispatches_are_spaced_by_min_interval() {
    let config = QueueConfig::default().with_rate_limit(100, Duration::from_secs(60));
    let queue = RequestQueue::new(config);
    let times = dispatch_times(&queue, 10).await;

    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(150));
    }
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_gives_up_after_max_retries() {
    let queue = RequestQueue::new(QueueConfig::default());
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&attempts);

    let result = queue
        .enqueue(move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().await.push(Instant::now());
                Err::<(), _>(TooManyRequests)
            }
        })
        .await;

    match result {
        Err(QueueError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, TooManyRequests);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let attempts = attempts.lock().await;
    assert_eq!(attempts.len(), 3);
    for pair in attempts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(3_000), "backoff too short: {gap:?}");
        assert!(gap < Duration::from_millis(6_000), "backoff too long: {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_single_attempt() {
    let queue = RequestQueue::new(QueueConfig::default().with_max_retries(0));
    let result = queue
        .enqueue(|| async { Err::<(), _>(TooManyRequests) })
        .await;
    assert_eq!(result.unwrap_err().attempts(), Some(1));
}
