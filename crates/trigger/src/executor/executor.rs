//! Executor trait and the lock-deduplicating executor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::lock::{LockError, LockService};
use crate::task::TimerTaskId;

/// Errors from executing one firing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Lock service error
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// The side effect of the firing failed
    #[error("callback failed for {task_id}: {reason}")]
    Callback { task_id: TimerTaskId, reason: String },
}

/// Executes one due firing
///
/// Called from pool workers, possibly more than once for the same
/// [`TimerTaskId`]; implementations own their deduplication.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn work(&self, task_id: &TimerTaskId) -> Result<(), ExecutorError>;
}

/// The side effect of a firing (calling the timer's target, publishing, ...)
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn fire(&self, task_id: &TimerTaskId) -> Result<(), String>;
}

/// Executor that fires each [`TimerTaskId`] at most once per lock TTL
///
/// The lock is kept after a successful firing so redeliveries inside the
/// TTL are skipped, and released after a failed one so a redelivery can
/// try again.
pub struct LockingExecutor {
    locks: Arc<dyn LockService>,
    callback: Arc<dyn TaskCallback>,
    lock_ttl: Duration,
    owner: String,
}

impl LockingExecutor {
    /// Create an executor; `lock_ttl` should outlive the redelivery window
    pub fn new(
        locks: Arc<dyn LockService>,
        callback: Arc<dyn TaskCallback>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            locks,
            callback,
            lock_ttl,
            owner: format!("executor-{}", Uuid::now_v7()),
        }
    }

    /// Lock key guarding one firing
    pub fn lock_key(task_id: &TimerTaskId) -> String {
        format!("trigger_lock_{task_id}")
    }
}

#[async_trait]
impl Executor for LockingExecutor {
    #[instrument(skip(self, task_id), fields(task_id = %task_id, owner = %self.owner))]
    async fn work(&self, task_id: &TimerTaskId) -> Result<(), ExecutorError> {
        let key = Self::lock_key(task_id);

        if !self
            .locks
            .try_acquire(&key, &self.owner, self.lock_ttl)
            .await?
        {
            debug!("firing already taken, skipping");
            return Ok(());
        }

        if let Err(reason) = self.callback.fire(task_id).await {
            if let Err(e) = self.locks.release(&key, &self.owner).await {
                warn!(error = %e, "failed to release lock after callback failure");
            }
            return Err(ExecutorError::Callback {
                task_id: *task_id,
                reason,
            });
        }

        debug!("firing executed");
        Ok(())
    }
}
