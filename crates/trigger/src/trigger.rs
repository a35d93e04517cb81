//! Minute bucket orchestration
//!
//! [`TriggerWorker::work`] turns one bucket message into firings. The first
//! sub-window is dispatched at once; the rest follow one per `gap` tick.
//! Each sub-window handler queries its due tasks and submits one unit per
//! task to the shared pool. The bucket is acked only when every handler
//! finished without recording an error.
//!
//! ```text
//!   t=0      t=gap     t=2·gap           t=60s
//!    │         │          │                 │
//!    ▼         ▼          ▼                 ▼
//!  [w0]──▶   peek      peek      ...      peek ──▶ join ──▶ peek ──▶ ack
//!            [w1]──▶   [w2]──▶
//! ```
//!
//! Handlers are never cancelled. When a tick finds an error the call
//! returns at once and handlers still in flight run to completion on
//! their own.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::bucket::{BucketKey, BucketKeyError, SubWindow};
use crate::config::{ConfigError, TriggerConfig};
use crate::executor::Executor;
use crate::pool::{PoolError, TaskPool};
use crate::slot::ErrorSlot;
use crate::store::{StoreError, TaskQuery};
use crate::task::TimerTaskId;

/// Batch-level failure of one bucket
///
/// Any of these withholds the ack. Executor failures are not among them:
/// they are logged where they happen and never fail the bucket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    /// The bucket key is malformed
    #[error(transparent)]
    Format(#[from] BucketKeyError),

    /// A sub-window could not be queried
    #[error("query for window {window} failed: {source}")]
    Query {
        window: SubWindow,
        #[source]
        source: StoreError,
    },

    /// The pool refused a firing; later firings of the window were skipped
    #[error("dispatch of task {task_id} failed: {source}")]
    Dispatch {
        task_id: TimerTaskId,
        #[source]
        source: PoolError,
    },

    /// A sub-window handler panicked before finishing its window
    #[error("handler for window {window} panicked")]
    Panicked { window: SubWindow },
}

/// Turns minute bucket messages into firings
///
/// Cheap to clone; clones share the pool, store and executor. Any number of
/// [`work`](Self::work) calls may run at once, including several for the
/// same key.
#[derive(Clone)]
pub struct TriggerWorker {
    tasks: Arc<dyn TaskQuery>,
    pool: Arc<dyn TaskPool>,
    executor: Arc<dyn Executor>,
    gap: Duration,
}

impl TriggerWorker {
    /// Create a worker over the process-wide pool
    pub fn new(
        config: &TriggerConfig,
        tasks: Arc<dyn TaskQuery>,
        pool: Arc<dyn TaskPool>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tasks,
            pool,
            executor,
            gap: config.gap,
        })
    }

    /// Process one bucket message.
    ///
    /// Returns once every sub-window of the minute has been dispatched and
    /// joined, calling `ack` first if none of them failed. Returns early,
    /// without ack and without waiting, as soon as a tick observes a
    /// failure.
    #[instrument(skip(self, ack), fields(gap_secs = self.gap.as_secs()))]
    pub async fn work<A>(&self, key: &str, ack: A) -> Result<(), TriggerError>
    where
        A: FnOnce() + Send,
    {
        let bucket = BucketKey::parse(key)?;
        let errors = Arc::new(ErrorSlot::new());

        let outcome = self.run(key, &bucket, &errors).await;
        errors.close();
        let dropped = errors.dropped();
        if dropped > 0 {
            debug!(dropped, "later window errors discarded");
        }
        outcome?;

        ack();
        info!("ack success");
        Ok(())
    }

    async fn run(
        &self,
        key: &str,
        bucket: &BucketKey,
        errors: &Arc<ErrorSlot<TriggerError>>,
    ) -> Result<(), TriggerError> {
        let handlers = TaskTracker::new();
        let mut windows = SubWindow::tiling(bucket, self.gap).into_iter();

        if let Some(first) = windows.next() {
            self.dispatch(&handlers, key, first, errors);
        }

        let mut ticker = interval_at(Instant::now() + self.gap, self.gap);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(err) = errors.peek() {
                warn!(
                    error = %err,
                    in_flight = handlers.len(),
                    "bucket failed, returning without waiting for in-flight windows"
                );
                return Err(err);
            }

            match windows.next() {
                Some(window) => self.dispatch(&handlers, key, window, errors),
                None => break,
            }
        }

        handlers.close();
        handlers.wait().await;

        match errors.peek() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn dispatch(
        &self,
        handlers: &TaskTracker,
        key: &str,
        window: SubWindow,
        errors: &Arc<ErrorSlot<TriggerError>>,
    ) {
        debug!(window = %window, "dispatching window");

        let worker = self.clone();
        let key = key.to_string();
        let errors = Arc::clone(errors);
        handlers.spawn(
            async move {
                match AssertUnwindSafe(worker.handle_window(&key, window))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => errors.record(err),
                    Err(_) => {
                        error!(window = %window, "window handler panicked");
                        errors.record(TriggerError::Panicked { window });
                    }
                }
            }
            .in_current_span(),
        );
    }

    /// Query one sub-window and submit its firings.
    ///
    /// Stops at the first refused submission; firings already submitted
    /// still run.
    #[instrument(skip(self, key, window), fields(window = %window))]
    async fn handle_window(&self, key: &str, window: SubWindow) -> Result<(), TriggerError> {
        let bucket = BucketKey::parse(key)?.bucket();

        let tasks = self
            .tasks
            .get_due_tasks(key, bucket, window.start, window.end)
            .await
            .map_err(|source| TriggerError::Query { window, source })?;

        debug!(count = tasks.len(), "due tasks fetched");

        for task in tasks {
            let task_id = task.task_id();
            let executor = Arc::clone(&self.executor);

            let unit = async move {
                if let Err(e) = executor.work(&task_id).await {
                    error!(task_id = %task_id, error = %e, "executor work failed");
                }
            }
            .in_current_span()
            .boxed();

            self.pool
                .submit(unit)
                .map_err(|source| TriggerError::Dispatch { task_id, source })?;
        }

        Ok(())
    }
}
