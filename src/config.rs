use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Which background synchronization runs alongside on-demand lookups.
///
/// Chosen once when the client is built and never changed afterwards.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Only cache what single-domain lookups return; entries expire.
    #[default]
    OnDemand,
    /// Periodically resync the whole cache against the remote full list.
    PollingCache,
    /// Periodic resync plus incremental updates from the live feed.
    PollingCachePlusFeed,
}

impl StorageMode {
    pub fn uses_refresher(self) -> bool {
        matches!(self, StorageMode::PollingCache | StorageMode::PollingCachePlusFeed)
    }

    pub fn uses_feed(self) -> bool {
        matches!(self, StorageMode::PollingCachePlusFeed)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_identity")]
    pub identity: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    #[serde(default)]
    pub storage_mode: StorageMode,

    #[serde(default = "default_cache_period")]
    pub cache_period_secs: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

// Defaults
fn default_identity() -> String {
    "yachts-rs".to_string()
}
fn default_api_base_url() -> String {
    "https://phish.sinking.yachts/v2".to_string()
}
fn default_feed_url() -> String {
    "wss://phish.sinking.yachts/feed".to_string()
}
fn default_cache_period() -> u64 {
    3600
}
fn default_refresh_interval() -> u64 {
    900 // 15 minutes
}
fn default_reconnect_delay() -> u64 {
    10
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            api_base_url: default_api_base_url(),
            feed_url: default_feed_url(),
            storage_mode: StorageMode::default(),
            cache_period_secs: default_cache_period(),
            refresh_interval_secs: default_refresh_interval(),
            reconnect_delay_secs: default_reconnect_delay(),
            request_timeout_ms: default_request_timeout_ms(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects periods that would make a background loop spin or panic.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.refresh_interval_secs > 0,
            "refresh_interval_secs must be at least 1"
        );
        ensure!(
            self.reconnect_delay_secs > 0,
            "reconnect_delay_secs must be at least 1"
        );
        Ok(())
    }

    pub fn cache_period(&self) -> Duration {
        Duration::from_secs(self.cache_period_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
