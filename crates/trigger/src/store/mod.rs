//! Due-task discovery
//!
//! This module provides:
//! - [`TaskQuery`] trait the trigger worker reads due firings from
//! - [`InMemoryTaskStore`] for testing and local runs
//!
//! Real deployments back [`TaskQuery`] with an index keyed by bucket and
//! ordered by run time; this crate does not prescribe one.

mod memory;
mod query;

pub use memory::InMemoryTaskStore;
pub use query::{StoreError, TaskQuery};
