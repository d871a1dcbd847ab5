//! Reports over daily statistics and feed polls.

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use dockwatch_types::{DailyStat, StationStatus};

use crate::aggregate::DailyAggregator;
use crate::error::Result;
use crate::traits::{DailyStatStore, PeriodStore, SnapshotLog};

time::serde::format_description!(report_date, Date, "[year]-[month]-[day]");

/// Network-wide figures for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Stations with a stat row for the date.
    pub total_stations: usize,
    /// Mean of the per-station availability percentages.
    pub average_availability_percentage: f64,
    /// Sum of zero-bike time across stations, in hours.
    pub total_zero_bike_hours: f64,
    /// Stations with at least one zero-bike period.
    pub stations_with_zero_periods: usize,
}

/// Report for one date, built from stored [`DailyStat`] rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    /// The reported date.
    #[serde(with = "report_date")]
    pub date: Date,
    /// `None` when no stats exist for the date.
    pub summary: Option<ReportSummary>,
    /// Lowest availability first.
    pub worst_availability: Vec<DailyStat>,
    /// Most zero-bike periods first.
    pub most_zero_periods: Vec<DailyStat>,
    /// Highest availability first.
    pub best_availability: Vec<DailyStat>,
    /// Every row for the date.
    pub full_stats: Vec<DailyStat>,
}

impl DailyReport {
    /// Whether there was anything to report.
    pub fn is_empty(&self) -> bool {
        self.full_stats.is_empty()
    }
}

/// Build the report for `date`, keeping the top `top_n` stations per ranking.
pub fn build_report<S>(store: &S, date: Date, top_n: usize) -> Result<DailyReport>
where
    S: DailyStatStore + ?Sized,
{
    let stats = store.daily_stats_for(date)?;
    if stats.is_empty() {
        return Ok(DailyReport {
            date,
            summary: None,
            worst_availability: Vec::new(),
            most_zero_periods: Vec::new(),
            best_availability: Vec::new(),
            full_stats: Vec::new(),
        });
    }

    let total_stations = stats.len();
    let total_zero_seconds: i64 = stats.iter().map(|s| s.zero_bike_seconds).sum();
    let average_availability_percentage =
        stats.iter().map(|s| s.availability_percentage).sum::<f64>() / total_stations as f64;

    let mut worst = stats.clone();
    worst.sort_by(|a, b| {
        a.availability_percentage
            .total_cmp(&b.availability_percentage)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
    let mut best = worst.clone();
    best.reverse();
    worst.truncate(top_n);
    best.truncate(top_n);

    let mut most_zero = stats.clone();
    most_zero.sort_by(|a, b| {
        b.num_zero_periods
            .cmp(&a.num_zero_periods)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
    most_zero.truncate(top_n);

    Ok(DailyReport {
        date,
        summary: Some(ReportSummary {
            total_stations,
            average_availability_percentage,
            total_zero_bike_hours: total_zero_seconds as f64 / 3600.0,
            stations_with_zero_periods: stats.iter().filter(|s| s.num_zero_periods > 0).count(),
        }),
        worst_availability: worst,
        most_zero_periods: most_zero,
        best_availability: best,
        full_stats: stats,
    })
}

/// Daily stats for the last `days` days up to the date containing `as_of`,
/// oldest first, computed from raw data without writing.
///
/// Days without snapshots are skipped.
pub fn station_history<S>(
    aggregator: &DailyAggregator<'_, S>,
    station_id: &str,
    days: u32,
    as_of: OffsetDateTime,
) -> Result<Vec<DailyStat>>
where
    S: SnapshotLog + PeriodStore + DailyStatStore + ?Sized,
{
    let today = as_of.to_offset(aggregator.options().utc_offset).date();
    let mut history = Vec::new();

    for back in (0..days).rev() {
        let Some(date) = today.checked_sub(Duration::days(i64::from(back))) else {
            continue;
        };
        match aggregator.evaluate_at(station_id, date, as_of) {
            Ok(stat) => history.push(stat),
            Err(e) if e.is_no_data() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(history)
}

/// Network totals for a single poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedSummary {
    /// Stations in the poll.
    pub total_stations: usize,
    /// Bikes available across all stations.
    pub total_bikes: u64,
    /// Empty docks across stations that report them.
    pub total_docks: u64,
    /// Stations with at least one bike.
    pub stations_with_bikes: usize,
    /// Stations with no bikes.
    pub empty_stations: usize,
    /// Mean bikes per station.
    pub average_bikes_per_station: f64,
}

impl FeedSummary {
    /// Summarize one poll's records.
    pub fn from_records(records: &[StationStatus]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let total_bikes: u64 = records.iter().map(|r| u64::from(r.bikes_available)).sum();
        let stations_with_bikes = records.iter().filter(|r| r.bikes_available > 0).count();

        Self {
            total_stations: records.len(),
            total_bikes,
            total_docks: records
                .iter()
                .filter_map(|r| r.docks_available)
                .map(u64::from)
                .sum(),
            stations_with_bikes,
            empty_stations: records.len() - stations_with_bikes,
            average_bikes_per_station: total_bikes as f64 / records.len() as f64,
        }
    }
}
