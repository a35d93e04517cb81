//! Worker pool for firing execution
//!
//! This module provides:
//! - [`TaskPool`] - The submission seam the trigger worker depends on
//! - [`WorkerPool`] - Fixed-size pool with a bounded queue and fail-fast submit
//! - [`PoolLoad`] - Lock-free load counters for the pool
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │                                                              │
//! │   submit() ──try_send──▶ ┌───────────────────────────┐      │
//! │   (never blocks)         │  bounded queue (capacity) │      │
//! │                          └─────────────┬─────────────┘      │
//! │                                        │                     │
//! │                                        ▼                     │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Workers (worker_count tokio tasks)           │    │
//! │  │  [Worker 1] [Worker 2] [Worker 3] ... [Worker N]    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One pool is started per process and shared by every concurrent bucket.

mod load;
mod pool;

pub use load::{PoolLoad, PoolStats};
pub use pool::{PoolError, TaskPool, Work, WorkerPool, WorkerPoolConfig, WorkerPoolStatus};
