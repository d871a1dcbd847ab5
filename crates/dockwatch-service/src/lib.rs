//! Collection service for bikeshare station availability.
//!
//! This crate wires the GBFS feed, the SQLite store and the zero-bike tracker
//! into poll cycles:
//! - [`Collector::run_once`] performs one fetch/store/track cycle
//! - [`Collector::run_continuous`] repeats cycles on an interval, aggregating
//!   each finished day and today's partial data on shutdown
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/dockwatch/config.toml`:
//!
//! ```toml
//! [feed]
//! station_status_url = "https://gbfs.beryl.cc/v2_2/Plymouth/station_status.json"
//! timeout_secs = 10
//!
//! [storage]
//! path = "~/.local/share/dockwatch/data.db"
//!
//! [collector]
//! interval_secs = 300
//! utc_offset = "+00:00"
//! ```
//!
//! Environment variables (`GBFS_API_URL`, `DB_PATH`, `COLLECTION_INTERVAL`, ...)
//! override the file; see [`config`].

pub mod collector;
pub mod config;

pub use collector::{Collector, CollectorOptions, CycleError, CycleReport, RunSummary};
pub use config::{
    CollectorConfig, Config, ConfigError, FeedConfig, LoggingConfig, RetrySettings, StorageConfig,
    ValidationError, default_config_path,
};
