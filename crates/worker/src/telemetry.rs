// Telemetry Module
//
// Console logging for the trigger worker process:
// - Filter from RUST_LOG or LOG_LEVEL, falling back to a per-service default
// - fmt layer with targets, so trigger and pool logs can be told apart

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for process telemetry
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once at startup
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "debug", "xtimer_trigger=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "xtimer-worker".to_string(),
            enable_console: true,
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "xtimer-worker")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "xtimer-worker".to_string()),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
        }
    }

    /// Filter used when none is configured or the configured one is invalid
    fn default_filter(&self) -> EnvFilter {
        EnvFilter::new("info")
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| self.default_filter())
    }
}

/// Install the global subscriber
///
/// Call once, early in `main`.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(console_layer).init();

    tracing::debug!(service = %config.service_name, "Telemetry initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = TelemetryConfig {
            log_filter: Some("[[not a filter".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn test_configured_filter_is_used() {
        let config = TelemetryConfig {
            log_filter: Some("xtimer_trigger=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "xtimer_trigger=debug");
    }
}
