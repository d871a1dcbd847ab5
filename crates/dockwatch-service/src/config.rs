//! Collector configuration.
//!
//! Configuration is read from `<config_dir>/dockwatch/config.toml`, then
//! environment variables override individual fields:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `GBFS_API_URL` | `feed.station_status_url` |
//! | `API_TIMEOUT` | `feed.timeout_secs` |
//! | `DB_PATH` | `storage.path` |
//! | `LOG_LEVEL` | `logging.level` |
//! | `COLLECTION_INTERVAL` | `collector.interval_secs` (given in minutes) |
//! | `ZERO_BIKE_THRESHOLD` | `collector.zero_bike_threshold` |
//! | `LOW_BIKE_THRESHOLD` | `collector.low_bike_threshold` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use dockwatch_core::{AggregatorOptions, FeedOptions, RetryConfig};
use dockwatch_types::parse_utc_offset;

/// Collector configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed settings.
    pub feed: FeedConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Poll loop and analysis settings.
    pub collector: CollectorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Every malformed value is reported, not just the first.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();

        if let Some(url) = lookup("GBFS_API_URL") {
            self.feed.station_status_url = url;
        }
        if let Some(secs) = parse_env(&lookup, "API_TIMEOUT", &mut errors) {
            self.feed.timeout_secs = secs;
        }
        if let Some(path) = lookup("DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(minutes) = parse_env::<u64>(&lookup, "COLLECTION_INTERVAL", &mut errors) {
            self.collector.interval_secs = minutes.saturating_mul(60);
        }
        if let Some(threshold) = parse_env(&lookup, "ZERO_BIKE_THRESHOLD", &mut errors) {
            self.collector.zero_bike_threshold = threshold;
        }
        if let Some(threshold) = parse_env(&lookup, "LOW_BIKE_THRESHOLD", &mut errors) {
            self.collector.low_bike_threshold = threshold;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use dockwatch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.feed.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.collector.validate());
        errors.extend(self.logging.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(ValidationError {
                field: key.to_string(),
                message: format!("invalid value '{raw}'"),
            });
            None
        }
    }
}

/// Feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// URL of `station_status.json`.
    pub station_status_url: String,
    /// URL of `station_information.json` for names and capacity.
    pub station_information_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Minimum milliseconds between two requests.
    pub min_fetch_interval_ms: u64,
    /// Record stations that are not renting.
    pub include_inactive: bool,
    /// Retry policy for failed fetches.
    pub retry: RetrySettings,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            station_status_url: dockwatch_core::DEFAULT_STATION_STATUS_URL.to_string(),
            station_information_url: None,
            timeout_secs: 10,
            min_fetch_interval_ms: 1000,
            include_inactive: false,
            retry: RetrySettings::default(),
        }
    }
}

impl FeedConfig {
    /// Options for the GBFS client.
    pub fn to_options(&self) -> FeedOptions {
        FeedOptions {
            station_status_url: self.station_status_url.clone(),
            station_information_url: self.station_information_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            min_fetch_interval: Duration::from_millis(self.min_fetch_interval_ms),
            include_inactive: self.include_inactive,
        }
    }

    /// Retry policy for the collector.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::for_feed()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    /// Validate feed configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !is_http_url(&self.station_status_url) {
            errors.push(ValidationError {
                field: "feed.station_status_url".to_string(),
                message: format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.station_status_url
                ),
            });
        }
        if let Some(url) = &self.station_information_url
            && !is_http_url(url)
        {
            errors.push(ValidationError {
                field: "feed.station_information_url".to_string(),
                message: format!("invalid URL '{url}': must start with http:// or https://"),
            });
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "feed.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is out of range (1-{} seconds)",
                    self.timeout_secs, MAX_TIMEOUT_SECS
                ),
            });
        }
        if self.retry.max_retries > MAX_RETRIES {
            errors.push(ValidationError {
                field: "feed.retry.max_retries".to_string(),
                message: format!("at most {MAX_RETRIES} retries are allowed"),
            });
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "feed.retry.initial_delay_ms".to_string(),
                message: "initial delay cannot exceed max delay".to_string(),
            });
        }

        errors
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

/// Maximum request timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 120;
/// Maximum retry attempts per fetch.
pub const MAX_RETRIES: u32 = 10;

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 15_000,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: dockwatch_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 10;
/// Maximum poll interval in seconds (1 day).
pub const MAX_POLL_INTERVAL: u64 = 86_400;

/// Poll loop and analysis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between poll cycles in continuous mode.
    pub interval_secs: u64,
    /// Bike count at or below which a station counts as empty.
    pub zero_bike_threshold: u32,
    /// Bike count at or below which a nonempty station counts as low.
    pub low_bike_threshold: u32,
    /// Fixed UTC offset of the city, e.g. `+01:00`; defines calendar days.
    pub utc_offset: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            zero_bike_threshold: 0,
            low_bike_threshold: dockwatch_core::DEFAULT_LOW_BIKE_THRESHOLD,
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Poll interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// The parsed reference offset.
    pub fn offset(&self) -> Result<UtcOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "collector.utc_offset".to_string(),
                message: e.to_string(),
            }])
        })
    }

    /// Options for the daily aggregator.
    pub fn aggregator_options(&self) -> Result<AggregatorOptions, ConfigError> {
        Ok(AggregatorOptions {
            utc_offset: self.offset()?,
            zero_bike_threshold: self.zero_bike_threshold,
            low_bike_threshold: self.low_bike_threshold,
        })
    }

    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "collector.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_POLL_INTERVAL
                ),
            });
        } else if self.interval_secs > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "collector.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_POLL_INTERVAL
                ),
            });
        }

        if self.low_bike_threshold < self.zero_bike_threshold {
            errors.push(ValidationError {
                field: "collector.low_bike_threshold".to_string(),
                message: format!(
                    "low-bike threshold {} is below the zero-bike threshold {}",
                    self.low_bike_threshold, self.zero_bike_threshold
                ),
            });
        }

        if let Err(e) = parse_utc_offset(&self.utc_offset) {
            errors.push(ValidationError {
                field: "collector.utc_offset".to_string(),
                message: format!("{e} (expected e.g. '+01:00' or 'Z')"),
            });
        }

        errors
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files (daily rotation); stderr only when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// Validate logging configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let level = self.level.to_lowercase();
        // Python-style WARNING is accepted for .env compatibility
        if !LOG_LEVELS.contains(&level.as_str()) && level != "warning" {
            errors.push(ValidationError {
                field: "logging.level".to_string(),
                message: format!(
                    "unknown level '{}': expected one of {}",
                    self.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }

    /// Level name understood by `tracing`.
    pub fn tracing_level(&self) -> String {
        match self.level.to_lowercase().as_str() {
            "warning" => "warn".to_string(),
            other => other.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `feed.timeout_secs`) or environment variable.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dockwatch")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::macros::offset;

    fn fields(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(
            config.feed.station_status_url,
            dockwatch_core::DEFAULT_STATION_STATUS_URL
        );
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.collector.interval_secs, 300);
        assert_eq!(config.collector.low_bike_threshold, 2);
        assert_eq!(config.storage.path, dockwatch_store::default_db_path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [feed]
            station_status_url = "https://example.com/gbfs/station_status.json"

            [collector]
            utc_offset = "+01:00"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.feed.retry, RetrySettings::default());
        assert_eq!(config.collector.interval_secs, 300);
        assert_eq!(config.collector.offset().unwrap(), offset!(+1));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.feed.station_information_url =
            Some("https://example.com/gbfs/station_information.json".to_string());
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.collector.interval_secs = 60;
        config.logging.file = Some(PathBuf::from("/tmp/logs"));

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/dockwatch.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[feed\ntimeout_secs = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GBFS_API_URL", "https://example.com/station_status.json"),
            ("API_TIMEOUT", "20"),
            ("DB_PATH", "/var/lib/dockwatch/data.db"),
            ("LOG_LEVEL", "DEBUG"),
            ("COLLECTION_INTERVAL", "15"),
            ("ZERO_BIKE_THRESHOLD", "1"),
            ("LOW_BIKE_THRESHOLD", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            config.feed.station_status_url,
            "https://example.com/station_status.json"
        );
        assert_eq!(config.feed.timeout_secs, 20);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/dockwatch/data.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.collector.interval_secs, 900);
        assert_eq!(config.collector.zero_bike_threshold, 1);
        assert_eq!(config.collector.low_bike_threshold, 3);
    }

    #[test]
    fn test_env_overrides_report_all_bad_values() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| match key {
                "API_TIMEOUT" => Some("soon".to_string()),
                "COLLECTION_INTERVAL" => Some("-5".to_string()),
                _ => None,
            })
            .unwrap_err();
        assert_eq!(fields(err), ["API_TIMEOUT", "COLLECTION_INTERVAL"]);
        assert_eq!(config.feed.timeout_secs, 10);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.feed.station_status_url = "ftp://example.com".to_string();
        config.feed.timeout_secs = 0;
        config.storage.path = PathBuf::new();
        config.collector.interval_secs = 5;
        config.collector.zero_bike_threshold = 3;
        config.collector.low_bike_threshold = 1;
        config.collector.utc_offset = "Europe/London".to_string();
        config.logging.level = "loud".to_string();

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("feed.station_status_url"));

        assert_eq!(
            fields(err),
            [
                "feed.station_status_url",
                "feed.timeout_secs",
                "storage.path",
                "collector.interval_secs",
                "collector.low_bike_threshold",
                "collector.utc_offset",
                "logging.level",
            ]
        );
    }

    #[test]
    fn test_retry_settings_validation() {
        let mut config = Config::default();
        config.feed.retry.max_retries = 50;
        config.feed.retry.initial_delay_ms = 20_000;
        assert_eq!(
            fields(config.validate().unwrap_err()),
            ["feed.retry.max_retries", "feed.retry.initial_delay_ms"]
        );
    }

    #[test]
    fn test_feed_options() {
        let mut config = FeedConfig::default();
        config.include_inactive = true;
        config.retry.max_retries = 1;

        let options = config.to_options();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.min_fetch_interval, Duration::from_secs(1));
        assert!(options.include_inactive);
        assert_eq!(config.retry_config().max_retries, 1);
    }

    #[test]
    fn test_logging_level_aliases() {
        let config = LoggingConfig {
            level: "WARNING".to_string(),
            file: None,
        };
        assert!(config.validate().is_empty());
        assert_eq!(config.tracing_level(), "warn");
    }
}
