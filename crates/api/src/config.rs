//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use monitor::MonitorConfig;
use order_store::RetryPolicy;
use realtime::RealtimeConfig;
use workflow::WorkflowConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL connection string; in-memory stores when unset
/// - `PLATFORM_FEE_RATE` — fee as a fraction of the subtotal (default: `0.015`)
/// - `STORE_RETRY_MAX_ATTEMPTS` (default: `3`), `STORE_RETRY_INITIAL_BACKOFF_MS`
///   (default: `100`), `STORE_RETRY_MULTIPLIER` (default: `2.0`)
/// - `SLOW_OPERATION_THRESHOLD_MS` (default: `1000`)
/// - `REALTIME_CHANNEL_CAPACITY` (default: `256`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub platform_fee_rate: f64,
    pub store_retry: RetryPolicy,
    pub slow_operation_threshold: Duration,
    pub realtime_channel_capacity: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(key, %value, "Ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy::new(
            env_or("STORE_RETRY_MAX_ATTEMPTS", defaults.store_retry.max_attempts),
            Duration::from_millis(env_or(
                "STORE_RETRY_INITIAL_BACKOFF_MS",
                defaults.store_retry.initial_backoff.as_millis() as u64,
            )),
            env_or("STORE_RETRY_MULTIPLIER", defaults.store_retry.multiplier),
        );

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            platform_fee_rate: env_or("PLATFORM_FEE_RATE", defaults.platform_fee_rate),
            store_retry: retry,
            slow_operation_threshold: Duration::from_millis(env_or(
                "SLOW_OPERATION_THRESHOLD_MS",
                defaults.slow_operation_threshold.as_millis() as u64,
            )),
            realtime_channel_capacity: env_or(
                "REALTIME_CHANNEL_CAPACITY",
                defaults.realtime_channel_capacity,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig::default()
            .with_fee_rate(self.platform_fee_rate)
            .with_retry(self.store_retry)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            slow_threshold: self.slow_operation_threshold,
            ..MonitorConfig::default()
        }
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            channel_capacity: self.realtime_channel_capacity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            platform_fee_rate: domain::DEFAULT_PLATFORM_FEE_RATE,
            store_retry: RetryPolicy::default(),
            slow_operation_threshold: Duration::from_millis(1000),
            realtime_channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.platform_fee_rate, 0.015);
        assert_eq!(config.store_retry.max_attempts, 3);
        assert_eq!(config.realtime_channel_capacity, 256);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_derived_component_configs() {
        let config = Config {
            platform_fee_rate: 0.02,
            slow_operation_threshold: Duration::from_millis(250),
            realtime_channel_capacity: 16,
            ..Config::default()
        };
        assert_eq!(config.workflow_config().platform_fee_rate, 0.02);
        assert_eq!(
            config.monitor_config().slow_threshold,
            Duration::from_millis(250)
        );
        assert_eq!(config.realtime_config().channel_capacity, 16);
    }
}
