//! TaskQuery trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::task::DueTask;

/// Error type for task store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    /// The query itself failed
    #[error("task query failed: {0}")]
    Query(String),
}

/// Source of due firings
#[async_trait]
pub trait TaskQuery: Send + Sync {
    /// Firings of shard `bucket` scheduled in `[start, end)`.
    ///
    /// `key` is the bucket message the query is made for; stores that index
    /// by message key can use it directly.
    async fn get_due_tasks(
        &self,
        key: &str,
        bucket: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueTask>, StoreError>;
}
