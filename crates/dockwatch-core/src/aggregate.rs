//! Daily statistics.
//!
//! [`DailyAggregator`] reads a station's snapshots and zero-bike periods for
//! one local calendar date and derives a [`DailyStat`]. Rows are recomputed
//! from raw data every time and upserted, so re-running an aggregation is
//! always safe.
//!
//! Open periods are treated as extending to `min(day end, as_of)`. For a past
//! date that is the end of the day; for the date in progress it is the
//! aggregation instant, so the number grows as the day goes on.

use time::{Date, OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use dockwatch_types::{DailyStat, DayWindow, StationSnapshot, ZeroBikePeriod};

use crate::error::{Error, Result};
use crate::traits::{DailyStatStore, PeriodStore, SnapshotLog};

/// Default low-bike threshold.
pub const DEFAULT_LOW_BIKE_THRESHOLD: u32 = 2;

/// Options for [`DailyAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Fixed offset of the feed's reference timezone.
    pub utc_offset: UtcOffset,
    /// Bike count at or below which a station counts as empty.
    pub zero_bike_threshold: u32,
    /// Bike count at or below which a nonempty station counts as low.
    pub low_bike_threshold: u32,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            utc_offset: UtcOffset::UTC,
            zero_bike_threshold: 0,
            low_bike_threshold: DEFAULT_LOW_BIKE_THRESHOLD,
        }
    }
}

/// Outcome of [`DailyAggregator::aggregate_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSummary {
    /// The aggregated date.
    pub date: Date,
    /// Stations with snapshots on the date.
    pub total_stations: usize,
    /// Stations whose row was written.
    pub stations_processed: usize,
}

/// Computes and stores per-station daily statistics.
pub struct DailyAggregator<'a, S: ?Sized> {
    store: &'a S,
    options: AggregatorOptions,
}

impl<'a, S> DailyAggregator<'a, S>
where
    S: SnapshotLog + PeriodStore + DailyStatStore + ?Sized,
{
    /// Create an aggregator over `store`.
    pub fn new(store: &'a S, options: AggregatorOptions) -> Self {
        Self { store, options }
    }

    /// The options in use.
    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// The UTC window covered by `date`.
    pub fn window(&self, date: Date) -> DayWindow {
        DayWindow::new(date, self.options.utc_offset)
    }

    /// Today's date in the reference timezone.
    pub fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.options.utc_offset).date()
    }

    /// Compute the stat for a station and date without writing it.
    pub fn evaluate_at(&self, station_id: &str, date: Date, as_of: OffsetDateTime) -> Result<DailyStat> {
        let window = self.window(date);
        let snapshots = self
            .store
            .snapshots_between(station_id, window.start(), window.end())?;
        let periods = self
            .store
            .periods_overlapping(station_id, window.start(), window.end())?;

        compute_daily_stat(station_id, &window, &snapshots, &periods, as_of, &self.options).ok_or_else(
            || Error::NoDataForDate {
                station_id: station_id.to_string(),
                date,
            },
        )
    }

    /// Aggregate a station's date as of now and upsert the row.
    pub fn aggregate(&self, station_id: &str, date: Date) -> Result<DailyStat> {
        self.aggregate_at(station_id, date, OffsetDateTime::now_utc())
    }

    /// Aggregate a station's date as of `as_of` and upsert the row.
    ///
    /// Fails with [`Error::NoDataForDate`] and writes nothing when the
    /// station has no snapshots that day.
    pub fn aggregate_at(&self, station_id: &str, date: Date, as_of: OffsetDateTime) -> Result<DailyStat> {
        let stat = self.evaluate_at(station_id, date, as_of)?;
        self.store.upsert_daily_stat(&stat)?;
        debug!(station_id, %date, zero_bike_seconds = stat.zero_bike_seconds, "daily stat written");
        Ok(stat)
    }

    /// Aggregate every station with snapshots on `date`, as of now.
    pub fn aggregate_all(&self, date: Date) -> Result<AggregationSummary> {
        self.aggregate_all_at(date, OffsetDateTime::now_utc())
    }

    /// Aggregate every station with snapshots on `date`.
    ///
    /// Per-station failures are logged and skipped.
    pub fn aggregate_all_at(&self, date: Date, as_of: OffsetDateTime) -> Result<AggregationSummary> {
        let window = self.window(date);
        let stations = self.store.stations_between(window.start(), window.end())?;

        let mut processed = 0;
        for station_id in &stations {
            match self.aggregate_at(station_id, date, as_of) {
                Ok(_) => processed += 1,
                Err(e) => warn!(station_id = %station_id, %date, error = %e, "Skipping station aggregation"),
            }
        }

        info!(
            "Calculated daily stats for {}/{} stations on {}",
            processed,
            stations.len(),
            date
        );
        Ok(AggregationSummary {
            date,
            total_stations: stations.len(),
            stations_processed: processed,
        })
    }
}

/// Derive a station's stat for one window.
///
/// `snapshots` must be the station's snapshots inside the window, oldest
/// first; `periods` its periods overlapping the window. Returns `None` when
/// there are no snapshots.
pub fn compute_daily_stat(
    station_id: &str,
    window: &DayWindow,
    snapshots: &[StationSnapshot],
    periods: &[ZeroBikePeriod],
    as_of: OffsetDateTime,
    options: &AggregatorOptions,
) -> Option<DailyStat> {
    let first = snapshots.first()?;

    let mut min_bikes = first.bikes_available;
    let mut max_bikes = first.bikes_available;
    let mut total: u64 = 0;
    for s in snapshots {
        min_bikes = min_bikes.min(s.bikes_available);
        max_bikes = max_bikes.max(s.bikes_available);
        total += u64::from(s.bikes_available);
    }
    let snapshot_count = snapshots.len();
    let avg_bikes = total as f64 / snapshot_count as f64;

    let clip_at = as_of.min(window.end());
    let mut zero_bike_seconds: i64 = 0;
    let mut longest: i64 = 0;
    let mut num_zero_periods: u32 = 0;
    for period in periods {
        if !window.overlaps(period.start_timestamp, period.end_timestamp) {
            continue;
        }
        let secs = period.seconds_within(window, clip_at);
        zero_bike_seconds += secs;
        longest = longest.max(secs);
        num_zero_periods += 1;
    }

    let low_bike_seconds: i64 = snapshots
        .windows(2)
        .filter(|pair| {
            let bikes = pair[0].bikes_available;
            bikes > options.zero_bike_threshold && bikes <= options.low_bike_threshold
        })
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).whole_seconds())
        .sum();

    let observed = window.observed_seconds(as_of);
    let availability_percentage = if observed > 0 {
        ((observed - zero_bike_seconds) as f64 / observed as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        100.0
    };

    Some(DailyStat {
        station_id: station_id.to_string(),
        date: window.date(),
        snapshot_count: u32::try_from(snapshot_count).unwrap_or(u32::MAX),
        min_bikes,
        max_bikes,
        avg_bikes,
        zero_bike_seconds,
        longest_zero_period_seconds: longest,
        num_zero_periods,
        low_bike_seconds,
        availability_percentage,
    })
}
