//! End-to-end tests for TriggerWorker over the in-memory store, the real
//! worker pool and the locking executor.
//!
//! Time is paused, so a whole minute of ticks runs instantly.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use xtimer_trigger::executor::InMemoryLockService;
use xtimer_trigger::prelude::*;

const MINUTE: i64 = 1_700_000_040;
const BUCKET: u32 = 3;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn key() -> String {
    format!("{MINUTE}_{BUCKET}")
}

/// Callback that remembers every firing it was asked to perform
#[derive(Default)]
struct RecordingCallback {
    fired: Mutex<Vec<TimerTaskId>>,
    fail: bool,
}

impl RecordingCallback {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn timer_ids(&self) -> BTreeSet<u64> {
        self.fired.lock().iter().map(|t| t.timer_id).collect()
    }
}

#[async_trait]
impl TaskCallback for RecordingCallback {
    async fn fire(&self, task_id: &TimerTaskId) -> Result<(), String> {
        self.fired.lock().push(*task_id);
        if self.fail {
            return Err("callback target unavailable".into());
        }
        Ok(())
    }
}

/// Pool that accepts units until the `reject_at`-th submission
struct RejectingPool {
    reject_at: usize,
    submitted: AtomicUsize,
}

impl TaskPool for RejectingPool {
    fn submit(&self, work: Work) -> Result<(), PoolError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.reject_at {
            return Err(PoolError::Saturated { capacity: 0 });
        }
        tokio::spawn(work);
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryTaskStore>,
    pool: Arc<WorkerPool>,
    callback: Arc<RecordingCallback>,
    trigger: TriggerWorker,
    acks: Arc<AtomicUsize>,
}

impl Harness {
    fn new(gap_secs: u64, callback: RecordingCallback) -> Self {
        let config = TriggerConfig::new(Duration::from_secs(gap_secs))
            .with_pool(WorkerPoolConfig::new(8).with_queue_capacity(256));
        let store = Arc::new(InMemoryTaskStore::new());
        let pool = WorkerPool::start(config.pool.clone());
        let callback = Arc::new(callback);
        let executor = LockingExecutor::new(
            Arc::new(InMemoryLockService::new()),
            callback.clone(),
            Duration::from_secs(70),
        );
        let trigger =
            TriggerWorker::new(&config, store.clone(), pool.clone(), Arc::new(executor)).unwrap();

        Self {
            store,
            pool,
            callback,
            trigger,
            acks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One firing per second of the bucket minute, timer id = second offset
    fn schedule_every_second(&self) {
        for offset in 0..60 {
            self.store
                .schedule(BUCKET, DueTask::new(offset as u64, at(MINUTE + offset)));
        }
    }

    async fn work(&self, key: &str) -> Result<(), TriggerError> {
        let acks = self.acks.clone();
        self.trigger
            .work(key, move || {
                acks.fetch_add(1, Ordering::SeqCst);
            })
            .await
    }

    fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    /// Let every submitted firing finish
    async fn drain(&self) {
        self.pool.shutdown().await.expect("pool should drain");
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_gap_dividing_minute_covers_whole_bucket() {
    let h = Harness::new(10, RecordingCallback::default());
    h.schedule_every_second();

    h.work(&key()).await.expect("bucket should succeed");
    h.drain().await;

    assert_eq!(h.store.query_count(), 6);
    assert_eq!(h.callback.timer_ids(), (0..60).collect());
    assert_eq!(h.acks(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_gap_not_dividing_minute_leaves_tail_unscanned() {
    let h = Harness::new(7, RecordingCallback::default());
    h.schedule_every_second();

    h.work(&key()).await.expect("bucket should succeed");
    h.drain().await;

    // 8 windows of 7s: 56 seconds covered, 56..60 never scanned
    assert_eq!(h.store.query_count(), 8);
    assert_eq!(h.callback.timer_ids(), (0..56).collect());
    assert_eq!(h.acks(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_firings_carry_composite_ids() {
    let h = Harness::new(30, RecordingCallback::default());
    h.store.schedule(BUCKET, DueTask::new(42, at(MINUTE + 31)));
    // Other shards and other minutes are not this bucket's business
    h.store.schedule(BUCKET + 1, DueTask::new(43, at(MINUTE + 31)));
    h.store.schedule(BUCKET, DueTask::new(44, at(MINUTE + 60)));

    h.work(&key()).await.unwrap();
    h.drain().await;

    let fired: Vec<String> = h.callback.fired.lock().iter().map(|t| t.to_string()).collect();
    assert_eq!(fired, vec![format!("42_{}", (MINUTE + 31) * 1000)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_empty_bucket_is_acked() {
    let h = Harness::new(10, RecordingCallback::default());

    h.work(&key()).await.unwrap();

    assert_eq!(h.acks(), 1);
    assert!(h.callback.fired.lock().is_empty());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_query_failure_withholds_ack() {
    let h = Harness::new(10, RecordingCallback::default());
    h.schedule_every_second();
    h.store.fail_next_queries(1);

    let err = h.work(&key()).await.unwrap_err();

    match err {
        TriggerError::Query { window, .. } => assert_eq!(window.start, at(MINUTE)),
        other => panic!("expected query error, got {other:?}"),
    }
    assert_eq!(h.acks(), 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_redelivery_after_failure_succeeds() {
    let h = Harness::new(10, RecordingCallback::default());
    h.schedule_every_second();
    h.store.fail_next_queries(1);

    assert!(h.work(&key()).await.is_err());
    h.work(&key()).await.expect("redelivery should succeed");
    h.drain().await;

    assert_eq!(h.acks(), 1);
    assert_eq!(h.callback.timer_ids(), (0..60).collect());
    // No firing ran twice even though the minute was processed twice
    assert_eq!(h.callback.fired.lock().len(), 60);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_submit_failure_stops_window() {
    let store = Arc::new(InMemoryTaskStore::new());
    for id in 1..=5 {
        store.schedule(BUCKET, DueTask::new(id, at(MINUTE + 1)));
    }
    let pool = Arc::new(RejectingPool {
        reject_at: 3,
        submitted: AtomicUsize::new(0),
    });
    let callback = Arc::new(RecordingCallback::default());
    let executor = LockingExecutor::new(
        Arc::new(InMemoryLockService::new()),
        callback.clone(),
        Duration::from_secs(70),
    );
    let trigger = TriggerWorker::new(
        &TriggerConfig::new(Duration::from_secs(60)),
        store,
        pool.clone(),
        Arc::new(executor),
    )
    .unwrap();
    let acked = AtomicUsize::new(0);

    let err = trigger
        .work(&key(), || {
            acked.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap_err();
    tokio::task::yield_now().await;

    match err {
        TriggerError::Dispatch { task_id, .. } => assert_eq!(task_id.timer_id, 3),
        other => panic!("expected dispatch error, got {other:?}"),
    }
    // Tasks 4 and 5 were never offered to the pool
    assert_eq!(pool.submitted.load(Ordering::SeqCst), 3);
    assert_eq!(callback.timer_ids(), BTreeSet::from([1, 2]));
    assert_eq!(acked.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_saturated_pool_fails_bucket() {
    let config = TriggerConfig::new(Duration::from_secs(60))
        .with_pool(WorkerPoolConfig::new(1).with_queue_capacity(1));
    let store = Arc::new(InMemoryTaskStore::new());
    for id in 0..20 {
        store.schedule(BUCKET, DueTask::new(id, at(MINUTE)));
    }
    let pool = WorkerPool::start(config.pool.clone());
    let executor = LockingExecutor::new(
        Arc::new(InMemoryLockService::new()),
        Arc::new(RecordingCallback::default()),
        Duration::from_secs(70),
    );
    let trigger = TriggerWorker::new(&config, store, pool.clone(), Arc::new(executor)).unwrap();

    let err = trigger.work(&key(), || {}).await.unwrap_err();

    assert!(matches!(
        err,
        TriggerError::Dispatch {
            source: PoolError::Saturated { .. },
            ..
        }
    ));
    assert!(pool.stats().rejected > 0);
    pool.shutdown().await.unwrap();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_closed_pool_fails_bucket() {
    let h = Harness::new(10, RecordingCallback::default());
    h.schedule_every_second();
    h.drain().await;

    let err = h.work(&key()).await.unwrap_err();

    assert!(matches!(
        err,
        TriggerError::Dispatch {
            source: PoolError::Closed,
            ..
        }
    ));
    assert_eq!(h.acks(), 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_executor_failure_still_acks() {
    let h = Harness::new(20, RecordingCallback::failing());
    h.schedule_every_second();

    h.work(&key()).await.expect("executor failures do not fail the bucket");
    h.drain().await;

    assert_eq!(h.acks(), 1);
    assert_eq!(h.callback.fired.lock().len(), 60);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_malformed_keys_are_rejected() {
    let h = Harness::new(10, RecordingCallback::default());

    for bad in ["", "1700000040", "1700000040_3_1", "abc_3", "1700000040_-1", "1700000040_x"] {
        let err = h.work(bad).await.unwrap_err();
        assert!(
            matches!(err, TriggerError::Format(_)),
            "{bad:?} should be a format error, got {err:?}"
        );
    }

    assert_eq!(h.acks(), 0);
    assert_eq!(h.store.query_count(), 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_concurrent_duplicate_work_terminates() {
    let h = Harness::new(10, RecordingCallback::default());
    h.schedule_every_second();
    let next_minute = format!("{}_{BUCKET}", MINUTE + 60);
    for offset in 60..120 {
        h.store
            .schedule(BUCKET, DueTask::new(offset as u64, at(MINUTE + offset)));
    }

    let (key_a, key_b) = (key(), key());
    let (a, b, c) = tokio::join!(h.work(&key_a), h.work(&key_b), h.work(&next_minute));
    a.unwrap();
    b.unwrap();
    c.unwrap();
    h.drain().await;

    assert_eq!(h.acks(), 3);
    // Duplicated dispatch is absorbed by the executor lock
    assert_eq!(h.callback.timer_ids(), (0..120).collect());
    assert_eq!(h.callback.fired.lock().len(), 120);
}
