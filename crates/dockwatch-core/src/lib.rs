//! Core library for bikeshare availability tracking.
//!
//! This crate turns a GBFS station feed into zero-bike intervals and daily
//! statistics. Persistence is abstracted behind small repository traits, so
//! everything here runs against the SQLite store from `dockwatch-store` or the
//! in-memory [`MemoryStore`] used in tests.
//!
//! # Features
//!
//! - **Feed client**: [`GbfsClient`] reads `station_status.json` (v2 and v3)
//!   with optional station metadata and request rate limiting
//! - **Retry**: [`with_retry`] retries transient feed failures with backoff
//! - **Interval tracking**: [`ZeroBikeTracker`] opens and closes zero-bike
//!   periods as snapshots arrive, and resumes from persisted state
//! - **Daily aggregation**: [`DailyAggregator`] derives per-station
//!   [`DailyStat`] rows, clipping periods to the local calendar day
//! - **Reports**: [`build_report`], [`station_history`], [`FeedSummary`]
//!
//! # Quick Start
//!
//! ```
//! use dockwatch_core::{AggregatorOptions, DailyAggregator, MemoryStore, SnapshotLog, ZeroBikeTracker};
//! use dockwatch_types::StationSnapshot;
//! use time::macros::{date, datetime};
//!
//! let store = MemoryStore::new();
//! let mut tracker = ZeroBikeTracker::new(0);
//!
//! for (ts, bikes) in [
//!     (datetime!(2024-05-01 10:00 UTC), 5),
//!     (datetime!(2024-05-01 10:05 UTC), 0),
//!     (datetime!(2024-05-01 10:20 UTC), 3),
//! ] {
//!     let snapshot = StationSnapshot::new("S1", ts, bikes);
//!     store.append_snapshot(&snapshot).unwrap();
//!     tracker.process(&store, &snapshot).unwrap();
//! }
//!
//! let aggregator = DailyAggregator::new(&store, AggregatorOptions::default());
//! let stat = aggregator
//!     .aggregate_at("S1", date!(2024-05-01), datetime!(2024-05-02 00:00 UTC))
//!     .unwrap();
//! assert_eq!(stat.zero_bike_seconds, 900);
//! ```

pub mod aggregate;
pub mod error;
pub mod gbfs;
pub mod mock;
pub mod report;
pub mod retry;
pub mod tracker;
pub mod traits;

pub use aggregate::{
    AggregationSummary, AggregatorOptions, DEFAULT_LOW_BIKE_THRESHOLD, DailyAggregator,
    compute_daily_stat,
};
pub use error::{Error, FetchError, Result};
pub use gbfs::{
    DEFAULT_STATION_STATUS_URL, FeedOptions, GbfsClient, StationInfo, parse_station_information,
    parse_station_status,
};
pub use mock::{MemoryStore, MockFeed};
pub use report::{DailyReport, FeedSummary, ReportSummary, build_report, station_history};
pub use retry::{RetryConfig, with_retry};
pub use tracker::{OpenPeriod, Transition, ZeroBikeTracker};
pub use traits::{DailyStatStore, PeriodStore, SnapshotLog, StationFeed};

// Re-export from dockwatch-types
pub use dockwatch_types::{DailyStat, DayWindow, StationSnapshot, StationStatus, ZeroBikePeriod};
