//! Configuration management for lottoharvest
//!
//! This module handles loading and validating configuration from TOML files
//! and environment variables. Command-line flags are applied on top by the
//! binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetch settings
    pub crawler: CrawlerConfig,

    /// Crawl loop settings
    pub collection: CollectionConfig,

    /// Storage settings
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetch-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Site root for results pages
    pub base_url: String,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Attempts per crawl unit for transport failures
    pub max_retries: u32,

    /// Base delay between attempts
    pub retry_base_delay_ms: u64,

    /// User agents rotated per request
    pub user_agents: Vec<String>,
}

/// Crawl loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Jurisdictions per chunk
    pub batch_size: usize,

    /// Historical mode: upper bound on dates visited per jurisdiction
    pub max_days_back: u32,

    /// Historical mode: consecutive empty dates that end a jurisdiction
    pub max_consecutive_empty_days: u32,

    /// Window mode default length
    pub days_back: u32,

    /// Pause between dates of one jurisdiction
    pub pause_between_days_ms: u64,

    /// Pause between jurisdictions
    pub pause_between_states_ms: u64,

    /// Flush buffered records to storage once this many are pending
    pub max_buffered_records: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://path`, `sqlite::memory:` or `postgres://...`
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// How long to wait for a free pooled connection
    pub wait_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://www.lotterycorner.com"),
            requests_per_second: 2,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            user_agents: vec![format!("lottoharvest/{}", env!("CARGO_PKG_VERSION"))],
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_days_back: 365,
            max_consecutive_empty_days: 3,
            days_back: 7,
            pause_between_days_ms: 500,
            pause_between_states_ms: 2000,
            max_buffered_records: 500,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("sqlite://data/lottoharvest.db"),
            pool_size: 4,
            wait_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("pretty"),
        }
    }
}

/// Read an environment variable and parse it, ignoring unparsable values
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from a file when present, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `LOTTOHARVEST_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("LOTTOHARVEST_BASE_URL") {
            self.crawler.base_url = url;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_RATE_LIMIT") {
            self.crawler.requests_per_second = v;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_REQUEST_TIMEOUT") {
            self.crawler.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_MAX_RETRIES") {
            self.crawler.max_retries = v;
        }
        if let Ok(agent) = std::env::var("LOTTOHARVEST_USER_AGENT") {
            self.crawler.user_agents = vec![agent];
        }
        if let Some(v) = env_parse("LOTTOHARVEST_BATCH_SIZE") {
            self.collection.batch_size = v;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_MAX_DAYS_BACK") {
            self.collection.max_days_back = v;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_MAX_EMPTY_DAYS") {
            self.collection.max_consecutive_empty_days = v;
        }
        if let Ok(url) =
            std::env::var("LOTTOHARVEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            self.database.url = url;
        }
        if let Some(v) = env_parse("LOTTOHARVEST_POOL_SIZE") {
            self.database.pool_size = v;
        }
        if let Ok(level) = std::env::var("LOTTOHARVEST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOTTOHARVEST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.crawler.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", self.crawler.base_url))?;

        if self.crawler.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if !(1..=120).contains(&self.crawler.request_timeout_secs) {
            anyhow::bail!("request_timeout_secs must be between 1 and 120");
        }

        if self.crawler.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }

        if self.crawler.user_agents.is_empty() {
            anyhow::bail!("at least one user agent is required");
        }

        if self.collection.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.collection.max_consecutive_empty_days == 0 {
            anyhow::bail!("max_consecutive_empty_days must be greater than 0");
        }

        if self.collection.max_buffered_records == 0 {
            anyhow::bail!("max_buffered_records must be greater than 0");
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            anyhow::bail!("logging.format must be 'pretty' or 'json'");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut config = Config::default();
        config.collection.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_must_be_bounded() {
        let mut config = Config::default();
        config.crawler.request_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.crawler.request_timeout_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[collection]\nbatch_size = 10\n\n[database]\nurl = \"sqlite::memory:\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.collection.batch_size, 10);
        assert_eq!(config.collection.max_consecutive_empty_days, 3);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.crawler.base_url, "https://www.lotterycorner.com");
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[collection\nbatch_size = ").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
