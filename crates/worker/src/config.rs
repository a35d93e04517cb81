//! Process configuration

use std::time::Duration;

use xtimer_trigger::TriggerConfig;

/// Configuration of the trigger worker process
#[derive(Debug, Clone)]
pub struct WorkerProcessConfig {
    /// Sub-window length and pool sizing
    pub trigger: TriggerConfig,
    /// Shards per minute; one bucket message is produced for each
    pub bucket_count: u32,
    /// Wait before a failed bucket is delivered again
    pub redelivery_delay: Duration,
    /// Attempts after the first before a bucket is given up on
    pub max_redeliveries: u32,
    /// How long a fired task stays locked against duplicates
    pub lock_ttl: Duration,
    /// Timers to seed the in-memory store with at startup
    pub demo_timers: u64,
}

impl Default for WorkerProcessConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            bucket_count: 5,
            redelivery_delay: Duration::from_millis(1000),
            max_redeliveries: 3,
            lock_ttl: Duration::from_secs(70),
            demo_timers: 0,
        }
    }
}

impl WorkerProcessConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables (in addition to those of [`TriggerConfig::from_env`]):
    /// - `BUCKET_COUNT`: shards per minute (default: 5)
    /// - `REDELIVERY_DELAY_MS`: delay before redelivering a failed bucket (default: 1000)
    /// - `MAX_REDELIVERIES`: redeliveries before giving up on a bucket (default: 3)
    /// - `LOCK_TTL_SECONDS`: dedup lock lifetime (default: 70)
    /// - `DEMO_TIMERS`: timers seeded at startup (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            trigger: TriggerConfig::from_env(),
            bucket_count: env_parse("BUCKET_COUNT")
                .map(|n: u32| n.max(1))
                .unwrap_or(defaults.bucket_count),
            redelivery_delay: env_parse("REDELIVERY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redelivery_delay),
            max_redeliveries: env_parse("MAX_REDELIVERIES").unwrap_or(defaults.max_redeliveries),
            lock_ttl: env_parse("LOCK_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            demo_timers: env_parse("DEMO_TIMERS").unwrap_or(defaults.demo_timers),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
