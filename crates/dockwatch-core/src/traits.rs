//! Trait abstractions for the feed and the persistence layer.
//!
//! [`StationFeed`] abstracts over the real GBFS client and [`MockFeed`] for
//! tests. The three repository traits describe exactly what the tracker and
//! aggregator need from storage, so they run unchanged against SQLite
//! (`dockwatch-store`) and the in-memory [`MemoryStore`].
//!
//! [`MockFeed`]: crate::mock::MockFeed
//! [`MemoryStore`]: crate::mock::MemoryStore

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use dockwatch_types::{DailyStat, StationSnapshot, StationStatus, ZeroBikePeriod};

use crate::error::Result;

/// A source of current station status.
///
/// # Example
///
/// ```ignore
/// use dockwatch_core::{StationFeed, Result};
///
/// async fn count_empty<F: StationFeed>(feed: &F) -> Result<usize> {
///     let stations = feed.fetch_station_status().await?;
///     Ok(stations.iter().filter(|s| s.bikes_available == 0).count())
/// }
/// ```
#[async_trait]
pub trait StationFeed: Send + Sync {
    /// Fetch the current status of every station.
    ///
    /// All records returned by one call share the same `timestamp`.
    async fn fetch_station_status(&self) -> Result<Vec<StationStatus>>;

    /// Human-readable description of where the data comes from.
    fn source(&self) -> &str;
}

/// Append-only log of station snapshots.
pub trait SnapshotLog {
    /// Append a snapshot.
    ///
    /// Returns `false` when a snapshot for the same station and timestamp was
    /// already recorded (the write is ignored).
    fn append_snapshot(&self, snapshot: &StationSnapshot) -> Result<bool>;

    /// Snapshots for a station with `start <= timestamp < end`, oldest first.
    fn snapshots_between(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<StationSnapshot>>;

    /// The most recent snapshot of every station.
    fn latest_snapshots(&self) -> Result<Vec<StationSnapshot>>;

    /// Stations with at least one snapshot in `[start, end)`, sorted.
    fn stations_between(&self, start: OffsetDateTime, end: OffsetDateTime)
    -> Result<Vec<String>>;
}

/// Storage for zero-bike periods.
///
/// Implementations must reject a second open period for the same station.
pub trait PeriodStore {
    /// Insert a new open period and return it with its assigned id.
    fn open_period(&self, station_id: &str, start: OffsetDateTime) -> Result<ZeroBikePeriod>;

    /// Close an open period.
    fn close_period(&self, period_id: i64, end: OffsetDateTime, duration_seconds: i64)
    -> Result<()>;

    /// The open period for a station, if any.
    fn find_open_period(&self, station_id: &str) -> Result<Option<ZeroBikePeriod>>;

    /// Every open period across all stations.
    fn open_periods(&self) -> Result<Vec<ZeroBikePeriod>>;

    /// Periods of a station that overlap `[start, end)`, open or closed,
    /// ordered by start.
    fn periods_overlapping(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ZeroBikePeriod>>;
}

/// Storage for per-station daily aggregates.
pub trait DailyStatStore {
    /// Insert or replace the row for `(station_id, date)`.
    fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<()>;

    /// The row for `(station_id, date)`, if any.
    fn daily_stat(&self, station_id: &str, date: Date) -> Result<Option<DailyStat>>;

    /// All rows for a date, most zero-bike time first.
    fn daily_stats_for(&self, date: Date) -> Result<Vec<DailyStat>>;
}
