//! Due tasks and their firing identifiers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One concrete firing of a timer definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DueTask {
    /// Timer definition this firing belongs to
    pub timer_id: u64,

    /// When the firing is scheduled
    pub run_timer: DateTime<Utc>,
}

impl DueTask {
    pub fn new(timer_id: u64, run_timer: DateTime<Utc>) -> Self {
        Self {
            timer_id,
            run_timer,
        }
    }

    /// Identifier of this firing, as handed to the executor
    pub fn task_id(&self) -> TimerTaskId {
        TimerTaskId {
            timer_id: self.timer_id,
            run_at_millis: self.run_timer.timestamp_millis(),
        }
    }
}

/// Composite `<timerID>_<runTimerUnixMillis>` identifier.
///
/// Unique per firing, so repeated deliveries of the same minute can be
/// deduplicated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerTaskId {
    pub timer_id: u64,
    pub run_at_millis: i64,
}

impl TimerTaskId {
    /// Scheduled run time
    pub fn run_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.run_at_millis)
    }
}

impl fmt::Display for TimerTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timer_id, self.run_at_millis)
    }
}
