//! # Trigger Worker
//!
//! Turns one coarse "minute bucket" message into precise timer firings.
//!
//! ## Features
//!
//! - **Incremental discovery**: a minute is scanned in `gap`-sized sub-windows,
//!   the first right away and the rest as time passes
//! - **Shared fail-fast pool**: firings run on one bounded worker pool per
//!   process; a saturated pool fails the bucket instead of blocking it
//! - **First error wins**: the first failed sub-window decides the outcome
//! - **At-least-once**: a bucket is acked only after the whole minute
//!   succeeded; anything else relies on redelivery, and the executor
//!   deduplicates firings through a lock
//!
//! ## Architecture
//!
//! ```text
//! "1700000040_3" ──▶ ┌───────────────────────────────────────────────┐
//!                    │                TriggerWorker                   │
//!                    │  (one sub-window per tick, ErrorSlot, ack)    │
//!                    └───────────────────────────────────────────────┘
//!                             │                        │
//!                             ▼                        ▼
//!                    ┌─────────────────┐      ┌─────────────────┐
//!                    │    TaskQuery    │      │   WorkerPool    │
//!                    │ (due firings of │      │ (bounded queue, │
//!                    │  a sub-window)  │      │  N workers)     │
//!                    └─────────────────┘      └─────────────────┘
//!                                                      │
//!                                                      ▼
//!                                             ┌─────────────────┐
//!                                             │    Executor     │
//!                                             │ (lock + fire)   │
//!                                             └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use xtimer_trigger::prelude::*;
//!
//! let config = TriggerConfig::from_env();
//! let pool = WorkerPool::start(config.pool.clone());
//! let executor = LockingExecutor::new(locks, callback, Duration::from_secs(70));
//!
//! let trigger = TriggerWorker::new(&config, store, pool.clone(), Arc::new(executor))?;
//! trigger.work("1700000040_3", || message.ack()).await?;
//!
//! pool.shutdown().await?;
//! ```

pub mod bucket;
pub mod config;
pub mod executor;
pub mod pool;
pub mod slot;
pub mod store;
pub mod task;
pub mod trigger;

/// Prelude for common imports
pub mod prelude {
    pub use crate::bucket::{BucketKey, BucketKeyError, SubWindow};
    pub use crate::config::{ConfigError, TriggerConfig};
    pub use crate::executor::{
        Executor, ExecutorError, InMemoryLockService, LockError, LockService, LockingExecutor,
        TaskCallback,
    };
    pub use crate::pool::{PoolError, TaskPool, Work, WorkerPool, WorkerPoolConfig};
    pub use crate::store::{InMemoryTaskStore, StoreError, TaskQuery};
    pub use crate::task::{DueTask, TimerTaskId};
    pub use crate::trigger::{TriggerError, TriggerWorker};
}

// Re-export key types at crate root
pub use bucket::{BucketKey, BucketKeyError, SubWindow, BUCKET_SPAN};
pub use config::{ConfigError, TriggerConfig};
pub use executor::{Executor, ExecutorError, LockService, LockingExecutor, TaskCallback};
pub use pool::{PoolError, PoolStats, TaskPool, Work, WorkerPool, WorkerPoolConfig};
pub use slot::ErrorSlot;
pub use store::{InMemoryTaskStore, StoreError, TaskQuery};
pub use task::{DueTask, TimerTaskId};
pub use trigger::{TriggerError, TriggerWorker};
