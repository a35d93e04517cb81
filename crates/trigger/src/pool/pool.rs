//! Worker pool for firing execution
//!
//! Runs a fixed number of workers fed by a bounded queue. Submission never
//! waits: a full queue or a shut-down pool is reported as an error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use super::load::{PoolLoad, PoolStats};

/// A unit of work: a zero-argument future run once by some worker
pub type Work = BoxFuture<'static, ()>;

/// Something that accepts units of work without blocking the caller
pub trait TaskPool: Send + Sync {
    /// Hand a unit of work to the pool.
    ///
    /// Returns immediately. An error means the unit was not accepted and
    /// will never run; `Ok` makes no promise about when it runs.
    fn submit(&self, work: Work) -> Result<(), PoolError>;
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Pool identifier used in logs (generated if not provided)
    pub pool_id: String,

    /// Number of workers running units concurrently
    pub worker_count: usize,

    /// Units that may wait for a free worker before submit fails
    pub queue_capacity: usize,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_id: format!("pool-{}", Uuid::now_v7()),
            worker_count: 100,
            queue_capacity: 1000,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with the given worker count
    pub fn new(worker_count: usize) -> Self {
        Self::default().with_worker_count(worker_count)
    }

    /// Set the pool ID
    pub fn with_pool_id(mut self, id: impl Into<String>) -> Self {
        self.pool_id = id.into();
        self
    }

    /// Set the worker count
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting units
    Running,
    /// Finishing queued units, refusing new ones
    Draining,
    /// All workers have exited
    Stopped,
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every worker is busy and the queue is full
    #[error("worker pool saturated (queue capacity {capacity})")]
    Saturated { capacity: usize },

    /// The pool has been shut down
    #[error("worker pool is closed")]
    Closed,

    /// Shutdown did not finish in time
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Fixed-size pool of workers shared by all trigger invocations
///
/// # Example
///
/// ```ignore
/// use xtimer_trigger::pool::{WorkerPool, WorkerPoolConfig, TaskPool};
///
/// let pool = WorkerPool::start(WorkerPoolConfig::new(16));
///
/// pool.submit(Box::pin(async move {
///     // fire one task
/// }))?;
///
/// // ... later, graceful shutdown
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: RwLock<Option<mpsc::Sender<Work>>>,
    status: RwLock<WorkerPoolStatus>,
    load: Arc<PoolLoad>,
    workers: TaskTracker,
}

impl WorkerPool {
    /// Start the pool's workers on the current tokio runtime
    #[instrument(skip_all, fields(pool_id = %config.pool_id))]
    pub fn start(config: WorkerPoolConfig) -> Arc<Self> {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Work>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let load = Arc::new(PoolLoad::new(capacity));
        let workers = TaskTracker::new();

        for worker in 0..config.worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let load = Arc::clone(&load);
            let pool_id = config.pool_id.clone();
            workers.spawn(async move {
                loop {
                    // Lock only while waiting, so another worker can take the
                    // next unit while this one runs.
                    let next = { rx.lock().await.recv().await };
                    let Some(work) = next else {
                        break;
                    };

                    load.started();
                    let panicked = AssertUnwindSafe(work).catch_unwind().await.is_err();
                    if panicked {
                        error!(%pool_id, worker, "unit of work panicked");
                    }
                    load.finished(panicked);
                }
                trace!(%pool_id, worker, "worker exited");
            });
        }

        info!(
            worker_count = config.worker_count,
            queue_capacity = capacity,
            "Worker pool started"
        );

        Arc::new(Self {
            config,
            sender: RwLock::new(Some(tx)),
            status: RwLock::new(WorkerPoolStatus::Running),
            load,
            workers,
        })
    }

    /// Stop accepting units, let queued ones finish, and wait for the workers
    #[instrument(skip(self), fields(pool_id = %self.config.pool_id))]
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        {
            let mut status = self.status.write();
            if *status == WorkerPoolStatus::Stopped {
                return Ok(());
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!("Initiating graceful shutdown");

        // Dropping the last sender lets workers drain the queue and exit
        self.sender.write().take();
        self.workers.close();

        if tokio::time::timeout(self.config.shutdown_timeout, self.workers.wait())
            .await
            .is_err()
        {
            let stats = self.load.snapshot();
            warn!(
                queued = stats.queued,
                in_flight = stats.in_flight,
                "Shutdown timeout reached"
            );
            return Err(PoolError::ShutdownTimeout);
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!("Worker pool stopped");
        Ok(())
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Get current load counters
    pub fn stats(&self) -> PoolStats {
        self.load.snapshot()
    }
}

impl TaskPool for WorkerPool {
    fn submit(&self, work: Work) -> Result<(), PoolError> {
        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            self.load.rejected();
            return Err(PoolError::Closed);
        };

        self.load.enqueued();
        match tx.try_send(work) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.load.enqueue_failed();
                debug!(
                    pool_id = %self.config.pool_id,
                    available_slots = self.load.available_slots(),
                    "Submit rejected: queue full"
                );
                Err(PoolError::Saturated {
                    capacity: self.load.capacity(),
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.load.enqueue_failed();
                Err(PoolError::Closed)
            }
        }
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
