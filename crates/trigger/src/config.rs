//! Trigger worker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bucket::BUCKET_SPAN;
use crate::pool::WorkerPoolConfig;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid trigger configuration: {0}")]
    Invalid(String),
}

/// Configuration for the trigger worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    /// Length of one sub-window; should divide a minute evenly
    #[serde(with = "duration_secs")]
    pub gap: Duration,

    /// Pool that executes firings
    pub pool: WorkerPoolConfig,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            gap: Duration::from_secs(10),
            pool: WorkerPoolConfig::default(),
        }
    }
}

impl TriggerConfig {
    /// Create a configuration with the given sub-window length
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TRIGGER_GAP_SECONDS`: sub-window length (default: 10)
    /// - `TRIGGER_WORKERS`: pool worker count (default: 100)
    /// - `TRIGGER_QUEUE_CAPACITY`: pool queue capacity (default: 1000)
    /// - `TRIGGER_SHUTDOWN_TIMEOUT_MS`: pool drain timeout (default: 30000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let gap = env_parse("TRIGGER_GAP_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.gap);

        let mut pool = defaults.pool;
        if let Some(workers) = env_parse("TRIGGER_WORKERS") {
            pool = pool.with_worker_count(workers as usize);
        }
        if let Some(capacity) = env_parse("TRIGGER_QUEUE_CAPACITY") {
            pool = pool.with_queue_capacity(capacity as usize);
        }
        if let Some(ms) = env_parse("TRIGGER_SHUTDOWN_TIMEOUT_MS") {
            pool = pool.with_shutdown_timeout(Duration::from_millis(ms));
        }

        Self { gap, pool }
    }

    /// Set the sub-window length
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Set the pool configuration
    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Number of whole sub-windows one bucket is split into
    pub fn windows_per_bucket(&self) -> usize {
        if self.gap.is_zero() {
            return 0;
        }
        (BUCKET_SPAN.as_millis() / self.gap.as_millis()) as usize
    }

    /// Validate the configuration
    ///
    /// A gap that does not divide the minute is allowed, but the tail of
    /// every minute is then never scanned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gap.is_zero() {
            return Err(ConfigError::Invalid("gap must be positive".into()));
        }
        if self.gap > BUCKET_SPAN {
            return Err(ConfigError::Invalid(format!(
                "gap of {}s exceeds one minute",
                self.gap.as_secs()
            )));
        }
        if self.pool.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be positive".into()));
        }

        let tail = BUCKET_SPAN.as_millis() % self.gap.as_millis();
        if tail != 0 {
            warn!(
                gap_ms = self.gap.as_millis() as u64,
                unscanned_ms = tail as u64,
                windows = self.windows_per_bucket(),
                "gap does not divide a minute; the end of every bucket is never scanned"
            );
        }
        Ok(())
    }
}

fn env_parse(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Serde support for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TriggerConfig::default();
        assert_eq!(config.gap, Duration::from_secs(10));
        assert_eq!(config.windows_per_bucket(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TriggerConfig::new(Duration::from_secs(5))
            .with_pool(WorkerPoolConfig::new(4).with_queue_capacity(16));

        assert_eq!(config.gap, Duration::from_secs(5));
        assert_eq!(config.windows_per_bucket(), 12);
        assert_eq!(config.pool.worker_count, 4);
        assert_eq!(config.pool.queue_capacity, 16);
    }

    #[test]
    fn test_config_validation() {
        assert!(TriggerConfig::new(Duration::ZERO).validate().is_err());
        assert!(TriggerConfig::new(Duration::from_secs(61)).validate().is_err());
        // Allowed, only warned about
        assert!(TriggerConfig::new(Duration::from_secs(7)).validate().is_ok());
    }

    #[test]
    fn test_config_serde() {
        let config = TriggerConfig::new(Duration::from_secs(12));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["gap"], 12);

        let back: TriggerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
