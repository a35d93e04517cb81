//! Firing execution
//!
//! This module provides:
//! - [`Executor`] trait the trigger worker hands each due firing to
//! - [`LockingExecutor`] which deduplicates firings through a [`LockService`]
//!   before calling a [`TaskCallback`]
//! - [`InMemoryLockService`] for testing and single-process runs
//!
//! The trigger worker does not deduplicate. A minute may be delivered more
//! than once, so the same firing can reach the executor twice; the lock keyed
//! by [`TimerTaskId`](crate::TimerTaskId) makes the second one a no-op.

mod executor;
mod lock;

pub use executor::{Executor, ExecutorError, LockingExecutor, TaskCallback};
pub use lock::{InMemoryLockService, LockError, LockService};
