//! Configuration Module
//!
//! Environment and command-line configuration for the aggregate window.

mod settings;

pub use settings::{
    ApiKey, AppConfig, Cli, ConfigError, DEFAULT_CHANNEL_PREFIX, DEFAULT_FEED_URL, DEFAULT_TICKER,
    FeedSettings, WindowSettings,
};
