//! Firing callback and demo data for local runs

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};
use xtimer_trigger::{DueTask, InMemoryTaskStore, TaskCallback, TimerTaskId};

/// Callback that only logs each firing with how late it ran
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

#[async_trait]
impl TaskCallback for LoggingCallback {
    async fn fire(&self, task_id: &TimerTaskId) -> Result<(), String> {
        let Some(run_at) = task_id.run_at() else {
            warn!(task_id = %task_id, "run time out of range");
            return Err(format!("run time of {task_id} out of range"));
        };

        let lateness_ms = (Utc::now() - run_at).num_milliseconds();
        info!(
            timer_id = task_id.timer_id,
            run_at = %run_at,
            lateness_ms,
            "timer fired"
        );
        Ok(())
    }
}

/// Shard a timer's firings are stored under
pub fn bucket_of(timer_id: u64, bucket_count: u32) -> u32 {
    (timer_id % u64::from(bucket_count.max(1))) as u32
}

/// Schedule `count` timers, one firing each, spread over the three minutes
/// after `from`. Returns the firings added.
pub fn seed_demo_timers(
    store: &InMemoryTaskStore,
    count: u64,
    bucket_count: u32,
    from: DateTime<Utc>,
) -> Vec<DueTask> {
    (0..count)
        .map(|timer_id| {
            let offset_ms = ((timer_id * 7_919) % 180_000) as i64;
            let task = DueTask::new(timer_id, from + TimeDelta::milliseconds(offset_ms));
            store.schedule(bucket_of(timer_id, bucket_count), task.clone());
            task
        })
        .collect()
}
