//! Core types for station availability data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::window::DayWindow;

#[cfg(feature = "serde")]
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// One station record as reported by the feed during a poll.
///
/// This is the normalized shape every feed implementation returns; the core
/// never looks at transport or feed-version details.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationStatus {
    /// Stable station identifier.
    pub station_id: String,
    /// Human-readable station name, if the feed publishes one.
    pub name: Option<String>,
    /// Bikes currently available for rental.
    pub bikes_available: u32,
    /// Empty docks, if reported.
    pub docks_available: Option<u32>,
    /// Total dock capacity, if known.
    pub capacity: Option<u32>,
    /// Whether the station is accepting rentals.
    pub is_renting: bool,
    /// Whether the station is accepting returns.
    pub is_returning: bool,
    /// When the station last reported to the operator's backend.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_reported: Option<OffsetDateTime>,
    /// The poll instant this record was observed at.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl StationStatus {
    /// Convert this feed record into the snapshot row that gets persisted.
    #[must_use]
    pub fn to_snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            station_id: self.station_id.clone(),
            timestamp: self.timestamp,
            bikes_available: self.bikes_available,
            capacity: self.capacity,
            docks_available: self.docks_available,
            is_renting: self.is_renting,
            is_returning: self.is_returning,
            last_reported: self.last_reported,
        }
    }
}

/// One immutable availability observation for a station.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationSnapshot {
    /// Station identifier.
    pub station_id: String,
    /// When this observation was taken (UTC).
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Bikes available at `timestamp`.
    pub bikes_available: u32,
    /// Dock capacity, if known.
    pub capacity: Option<u32>,
    /// Empty docks, if reported.
    pub docks_available: Option<u32>,
    /// Whether the station was renting.
    pub is_renting: bool,
    /// Whether the station was accepting returns.
    pub is_returning: bool,
    /// Operator-side report time.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_reported: Option<OffsetDateTime>,
}

impl StationSnapshot {
    /// Build a minimal snapshot with only the required fields set.
    ///
    /// Renting and returning default to `true`; everything optional is `None`.
    #[must_use]
    pub fn new(station_id: impl Into<String>, timestamp: OffsetDateTime, bikes_available: u32) -> Self {
        Self {
            station_id: station_id.into(),
            timestamp,
            bikes_available,
            capacity: None,
            docks_available: None,
            is_renting: true,
            is_returning: true,
            last_reported: None,
        }
    }

    /// Set the capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// A maximal interval during which a station reported zero bikes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZeroBikePeriod {
    /// Row identifier assigned by the store.
    pub id: i64,
    /// Station identifier.
    pub station_id: String,
    /// First zero observation after a nonzero one (or the first observation).
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start_timestamp: OffsetDateTime,
    /// First nonzero observation after `start_timestamp`; `None` while open.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub end_timestamp: Option<OffsetDateTime>,
    /// `end - start` in whole seconds; set when the period closes.
    pub duration_seconds: Option<i64>,
}

impl ZeroBikePeriod {
    /// Create an open period starting at `start`.
    #[must_use]
    pub fn open(id: i64, station_id: impl Into<String>, start: OffsetDateTime) -> Self {
        Self {
            id,
            station_id: station_id.into(),
            start_timestamp: start,
            end_timestamp: None,
            duration_seconds: None,
        }
    }

    /// Whether the period is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    /// Return a closed copy of this period ending at `end`.
    ///
    /// Duration is never negative; callers guarantee `end >= start`.
    #[must_use]
    pub fn closed_at(&self, end: OffsetDateTime) -> Self {
        let duration = (end - self.start_timestamp).whole_seconds().max(0);
        Self {
            end_timestamp: Some(end),
            duration_seconds: Some(duration),
            ..self.clone()
        }
    }

    /// Seconds of this period that fall inside `window`.
    ///
    /// An open period is treated as extending to `as_of`, never past the end
    /// of the window.
    #[must_use]
    pub fn seconds_within(&self, window: &DayWindow, as_of: OffsetDateTime) -> i64 {
        let end = self.end_timestamp.unwrap_or(as_of);
        window.overlap_seconds(self.start_timestamp, end)
    }
}

/// Per-station, per-day aggregate derived from snapshots and zero-bike periods.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyStat {
    /// Station identifier.
    pub station_id: String,
    /// Calendar date in the feed's reference timezone.
    #[cfg_attr(feature = "serde", serde(with = "iso_date"))]
    pub date: Date,
    /// Number of snapshots taken that day.
    pub snapshot_count: u32,
    /// Lowest bike count observed.
    pub min_bikes: u32,
    /// Highest bike count observed.
    pub max_bikes: u32,
    /// Mean bike count over the day's snapshots, full precision.
    pub avg_bikes: f64,
    /// Seconds spent at zero inside the day window.
    pub zero_bike_seconds: i64,
    /// Longest single zero stretch inside the day window.
    pub longest_zero_period_seconds: i64,
    /// Zero-bike periods overlapping the day.
    pub num_zero_periods: u32,
    /// Seconds spent above zero but at or below the low-bike threshold.
    pub low_bike_seconds: i64,
    /// Share of the observed part of the day not spent at zero.
    pub availability_percentage: f64,
}

impl fmt::Display for DailyStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} snapshots, bikes {}..{} (avg {:.2}), zero {}s",
            self.station_id,
            self.date,
            self.snapshot_count,
            self.min_bikes,
            self.max_bikes,
            self.avg_bikes,
            self.zero_bike_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};
    use time::UtcOffset;

    #[test]
    fn test_status_to_snapshot() {
        let status = StationStatus {
            station_id: "S1".to_string(),
            name: Some("Harbour".to_string()),
            bikes_available: 4,
            docks_available: Some(6),
            capacity: Some(10),
            is_renting: true,
            is_returning: false,
            last_reported: None,
            timestamp: datetime!(2024-05-01 10:00 UTC),
        };

        let snapshot = status.to_snapshot();
        assert_eq!(snapshot.station_id, "S1");
        assert_eq!(snapshot.bikes_available, 4);
        assert_eq!(snapshot.capacity, Some(10));
        assert!(!snapshot.is_returning);
        assert_eq!(snapshot.timestamp, status.timestamp);
    }

    #[test]
    fn test_period_close_computes_duration() {
        let period = ZeroBikePeriod::open(1, "S1", datetime!(2024-05-01 10:05 UTC));
        assert!(period.is_open());

        let closed = period.closed_at(datetime!(2024-05-01 10:20 UTC));
        assert!(!closed.is_open());
        assert_eq!(closed.duration_seconds, Some(900));
    }

    #[test]
    fn test_period_seconds_within_clamps_to_window() {
        let window = DayWindow::new(date!(2024-05-02), UtcOffset::UTC);
        let period = ZeroBikePeriod::open(1, "S1", datetime!(2024-05-01 23:00 UTC))
            .closed_at(datetime!(2024-05-02 01:30 UTC));

        assert_eq!(
            period.seconds_within(&window, datetime!(2024-05-03 00:00 UTC)),
            5400
        );
    }

    #[test]
    fn test_open_period_extends_to_as_of() {
        let window = DayWindow::new(date!(2024-05-02), UtcOffset::UTC);
        let period = ZeroBikePeriod::open(1, "S1", datetime!(2024-05-02 08:00 UTC));

        assert_eq!(
            period.seconds_within(&window, datetime!(2024-05-02 09:00 UTC)),
            3600
        );
        // as_of past the window end is cut at midnight
        assert_eq!(
            period.seconds_within(&window, datetime!(2024-05-05 00:00 UTC)),
            16 * 3600
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_daily_stat_serializes_iso_date() {
        let stat = DailyStat {
            station_id: "S1".to_string(),
            date: date!(2024-05-01),
            snapshot_count: 4,
            min_bikes: 0,
            max_bikes: 5,
            avg_bikes: 2.0,
            zero_bike_seconds: 900,
            longest_zero_period_seconds: 900,
            num_zero_periods: 1,
            low_bike_seconds: 0,
            availability_percentage: 98.96,
        };

        let json = serde_json::to_string(&stat).unwrap();
        assert!(json.contains("\"date\":\"2024-05-01\""));

        let back: DailyStat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stat);
    }
}
