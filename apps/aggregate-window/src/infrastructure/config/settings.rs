//! Application Configuration Settings
//!
//! Configuration types for the aggregate window, loaded from environment
//! variables and overridden by command-line flags.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::FixedOffset;
use clap::Parser;

use crate::domain::window::RetentionPolicy;

/// Default instrument.
pub const DEFAULT_TICKER: &str = "BTC-USD";

/// Default crypto aggregate feed endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://socket.polygon.io/crypto";

/// Default prefix of the per-second aggregate channel.
pub const DEFAULT_CHANNEL_PREFIX: &str = "XA.";

/// Feed API key.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// The key itself.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// WebSocket URL.
    pub url: String,
    /// Instrument to subscribe to.
    pub ticker: String,
    /// Channel prefix prepended to the ticker.
    pub channel_prefix: String,
    /// API key sent in the auth message.
    pub api_key: ApiKey,
}

impl FeedSettings {
    /// Subscription channel, e.g. `XA.BTC-USD`.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{}{}", self.channel_prefix, self.ticker)
    }
}

/// Window and emission settings.
#[derive(Debug, Clone)]
pub struct WindowSettings {
    /// Time between print ticks.
    pub print_interval: Duration,
    /// Capacity of the frame queue between reader and consumer.
    pub queue_capacity: usize,
    /// Maximum bars retained (0 = unbounded).
    pub max_records: usize,
    /// Maximum span of retained bars (zero = unbounded).
    pub max_span: Duration,
    /// Offset used when rendering timestamps.
    pub utc_offset_secs: i32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            print_interval: Duration::from_secs(30),
            queue_capacity: 10_000,
            max_records: 10_000,
            max_span: Duration::ZERO,
            utc_offset_secs: 0,
        }
    }
}

impl WindowSettings {
    /// Retention policy for the window.
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_records: NonZeroUsize::new(self.max_records),
            max_span_ms: (!self.max_span.is_zero()).then(|| self.max_span.as_secs_f64() * 1000.0),
        }
    }

    /// Display offset for timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is outside ±24h.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_secs)
            .ok_or(ConfigError::InvalidValue("AGG_UTC_OFFSET_SECS".to_string()))
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Window and emission settings.
    pub window: WindowSettings,
    /// Health/metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

/// Command-line flags. Each one overrides its environment variable.
#[derive(Debug, Default, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Symbol for the crypto exchange, e.g. BTC-USD
    #[arg(long)]
    pub ticker: Option<String>,

    /// API key for the crypto WebSocket feed
    #[arg(long = "api-key", alias = "apiKey")]
    pub api_key: Option<String>,

    /// Seconds between prints
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

impl AppConfig {
    /// Create configuration from the process environment and flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or a value is invalid.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok(), cli)
    }

    /// Create configuration from environment variables only.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&Cli::default())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or a value is invalid.
    pub fn from_source<F>(lookup: F, cli: &Cli) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = cli
            .api_key
            .clone()
            .or_else(|| lookup("POLYGON_API_KEY"))
            .ok_or_else(|| ConfigError::MissingEnvVar("POLYGON_API_KEY".to_string()))?;

        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("POLYGON_API_KEY".to_string()));
        }

        let ticker = cli
            .ticker
            .clone()
            .or_else(|| lookup("AGG_TICKER"))
            .unwrap_or_else(|| DEFAULT_TICKER.to_string());

        if ticker.is_empty() {
            return Err(ConfigError::EmptyValue("AGG_TICKER".to_string()));
        }

        let feed = FeedSettings {
            url: lookup("AGG_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            ticker,
            channel_prefix: lookup("AGG_CHANNEL_PREFIX")
                .unwrap_or_else(|| DEFAULT_CHANNEL_PREFIX.to_string()),
            api_key: ApiKey::new(api_key),
        };

        let defaults = WindowSettings::default();
        let print_interval = cli.interval_secs.map_or_else(
            || parse_duration_secs(&lookup, "AGG_PRINT_INTERVAL_SECS", defaults.print_interval),
            Duration::from_secs,
        );

        if print_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "AGG_PRINT_INTERVAL_SECS".to_string(),
            ));
        }

        let queue_capacity = parse_or(&lookup, "AGG_QUEUE_CAPACITY", defaults.queue_capacity);
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("AGG_QUEUE_CAPACITY".to_string()));
        }

        let window = WindowSettings {
            print_interval,
            queue_capacity,
            max_records: parse_or(&lookup, "AGG_MAX_RECORDS", defaults.max_records),
            max_span: parse_duration_secs(&lookup, "AGG_MAX_SPAN_SECS", defaults.max_span),
            utc_offset_secs: parse_or(&lookup, "AGG_UTC_OFFSET_SECS", defaults.utc_offset_secs),
        };
        window.utc_offset()?;

        Ok(Self {
            feed,
            window,
            health_port: parse_or(&lookup, "AGG_HEALTH_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Value is out of range.
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_only_api_key() {
        let config =
            AppConfig::from_source(source(&[("POLYGON_API_KEY", "k")]), &Cli::default()).unwrap();

        assert_eq!(config.feed.ticker, "BTC-USD");
        assert_eq!(config.feed.url, DEFAULT_FEED_URL);
        assert_eq!(config.feed.channel(), "XA.BTC-USD");
        assert_eq!(config.window.print_interval, Duration::from_secs(30));
        assert_eq!(config.window.queue_capacity, 10_000);
        assert_eq!(config.health_port, 0);
    }

    #[test]
    fn missing_api_key_is_error() {
        let err = AppConfig::from_source(source(&[]), &Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn empty_api_key_is_error() {
        let err = AppConfig::from_source(source(&[("POLYGON_API_KEY", "")]), &Cli::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli {
            ticker: Some("ETH-USD".to_string()),
            api_key: Some("flag-key".to_string()),
            interval_secs: Some(5),
        };
        let config = AppConfig::from_source(
            source(&[
                ("POLYGON_API_KEY", "env-key"),
                ("AGG_TICKER", "SOL-USD"),
                ("AGG_PRINT_INTERVAL_SECS", "60"),
            ]),
            &cli,
        )
        .unwrap();

        assert_eq!(config.feed.ticker, "ETH-USD");
        assert_eq!(config.feed.api_key.expose(), "flag-key");
        assert_eq!(config.window.print_interval, Duration::from_secs(5));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = AppConfig::from_source(
            source(&[("POLYGON_API_KEY", "k"), ("AGG_PRINT_INTERVAL_SECS", "0")]),
            &Cli::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err = AppConfig::from_source(
            source(&[("POLYGON_API_KEY", "k"), ("AGG_QUEUE_CAPACITY", "0")]),
            &Cli::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let err = AppConfig::from_source(
            source(&[("POLYGON_API_KEY", "k"), ("AGG_UTC_OFFSET_SECS", "90000")]),
            &Cli::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn retention_settings() {
        let config = AppConfig::from_source(
            source(&[
                ("POLYGON_API_KEY", "k"),
                ("AGG_MAX_RECORDS", "0"),
                ("AGG_MAX_SPAN_SECS", "120"),
            ]),
            &Cli::default(),
        )
        .unwrap();

        let retention = config.window.retention();
        assert!(retention.max_records.is_none());
        assert_eq!(retention.max_span_ms, Some(120_000.0));
    }

    #[test]
    fn default_retention_is_bounded_by_count() {
        let retention = WindowSettings::default().retention();
        assert_eq!(retention.max_records.map(NonZeroUsize::get), Some(10_000));
        assert!(retention.max_span_ms.is_none());
    }

    #[test]
    fn api_key_redacted_debug() {
        let key = ApiKey::new("secret456".to_string());
        let debug = format!("{key:?}");
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["aggregate-window", "--ticker", "ETH-USD", "--apiKey", "abc"]);
        assert_eq!(cli.ticker.as_deref(), Some("ETH-USD"));
        assert_eq!(cli.api_key.as_deref(), Some("abc"));
        assert!(cli.interval_secs.is_none());
    }
}
