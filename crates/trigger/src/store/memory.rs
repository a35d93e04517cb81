//! In-memory implementation of TaskQuery for testing

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::query::{StoreError, TaskQuery};
use crate::task::DueTask;

/// Firings of one shard, ordered by run time then timer
type Shard = BTreeMap<(DateTime<Utc>, u64), DueTask>;

/// In-memory implementation of TaskQuery
///
/// Keeps one ordered index per bucket, so a query is a range scan the same
/// way a sorted-set backed store would answer it.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use xtimer_trigger::store::InMemoryTaskStore;
/// use xtimer_trigger::DueTask;
///
/// let store = InMemoryTaskStore::new();
/// store.schedule(0, DueTask::new(1, Utc::now()));
/// assert_eq!(store.len(), 1);
/// ```
pub struct InMemoryTaskStore {
    shards: RwLock<HashMap<u32, Shard>>,
    failures: AtomicUsize,
    queries: AtomicUsize,
}

impl InMemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            failures: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Add a firing to a shard. Re-adding the same firing is a no-op.
    pub fn schedule(&self, bucket: u32, task: DueTask) {
        self.shards
            .write()
            .entry(bucket)
            .or_default()
            .insert((task.run_timer, task.timer_id), task);
    }

    /// Number of stored firings
    pub fn len(&self) -> usize {
        self.shards.read().values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no firings
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `n` queries fail (for testing)
    pub fn fail_next_queries(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of queries answered so far, failed ones included
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQuery for InMemoryTaskStore {
    async fn get_due_tasks(
        &self,
        key: &str,
        bucket: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueTask>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure for {key}")));
        }

        if end <= start {
            return Ok(vec![]);
        }

        let shards = self.shards.read();
        let Some(shard) = shards.get(&bucket) else {
            return Ok(vec![]);
        };

        Ok(shard
            .range((start, 0)..(end, 0))
            .map(|(_, task)| task.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_range_is_half_open() {
        let store = InMemoryTaskStore::new();
        store.schedule(1, DueTask::new(1, at(100)));
        store.schedule(1, DueTask::new(2, at(105)));
        store.schedule(1, DueTask::new(3, at(110)));

        let tasks = store
            .get_due_tasks("60_1", 1, at(100), at(110))
            .await
            .expect("should query");

        let ids: Vec<u64> = tasks.iter().map(|t| t.timer_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_shards_are_isolated() {
        let store = InMemoryTaskStore::new();
        store.schedule(1, DueTask::new(1, at(100)));
        store.schedule(2, DueTask::new(2, at(100)));

        let tasks = store.get_due_tasks("60_2", 2, at(60), at(120)).await.unwrap();
        assert_eq!(tasks, vec![DueTask::new(2, at(100))]);

        let none = store.get_due_tasks("60_3", 3, at(60), at(120)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_ordered_by_run_time() {
        let store = InMemoryTaskStore::new();
        store.schedule(0, DueTask::new(9, at(103)));
        store.schedule(0, DueTask::new(5, at(101)));
        store.schedule(0, DueTask::new(7, at(101)));

        let tasks = store.get_due_tasks("60_0", 0, at(100), at(110)).await.unwrap();
        let ids: Vec<u64> = tasks.iter().map(|t| t.timer_id).collect();
        assert_eq!(ids, vec![5, 7, 9]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryTaskStore::new();
        store.fail_next_queries(1);

        let err = store.get_due_tasks("60_0", 0, at(60), at(70)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.get_due_tasks("60_0", 0, at(60), at(70)).await.is_ok());
        assert_eq!(store.query_count(), 2);
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let store = InMemoryTaskStore::new();
        assert!(store.is_empty());

        store.schedule(0, DueTask::new(1, at(100)));
        store.schedule(0, DueTask::new(1, at(100)));
        store.schedule(1, DueTask::new(1, at(160)));
        store.schedule(1, DueTask::new(2, at(160)));
        assert_eq!(store.len(), 3);
    }
}
