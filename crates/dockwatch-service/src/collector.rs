//! Poll cycle orchestration.
//!
//! A cycle fetches the feed, appends one snapshot per station and feeds each
//! new snapshot to the zero-bike tracker. All writes of a cycle share one
//! SQLite transaction, and the tracker is updated on a staged copy that only
//! replaces the live one after the commit. A failed cycle therefore leaves
//! neither snapshots nor tracker changes behind.

use std::time::Duration;

use time::{Date, OffsetDateTime};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dockwatch_core::{
    AggregationSummary, AggregatorOptions, DailyAggregator, FeedSummary, RetryConfig,
    StationFeed, StationStatus, Transition, ZeroBikeTracker, with_retry,
};
use dockwatch_store::Store;

use crate::config::{Config, ConfigError};

/// Settings for a [`Collector`].
#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Retry policy for feed fetches.
    pub retry: RetryConfig,
    /// Thresholds and reference timezone.
    pub aggregator: AggregatorOptions,
}

impl CollectorOptions {
    /// Build options from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            retry: config.feed.retry_config(),
            aggregator: config.collector.aggregator_options()?,
        })
    }
}

/// What one successful cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Poll instant shared by the cycle's records; `None` if the feed was empty.
    pub timestamp: Option<OffsetDateTime>,
    /// Records returned by the feed.
    pub fetched: usize,
    /// Snapshots written.
    pub stored: usize,
    /// Records already stored for the same station and timestamp.
    pub duplicates: usize,
    /// Zero-bike periods opened.
    pub opened: usize,
    /// Zero-bike periods closed.
    pub closed: usize,
    /// Stations rejected as out of order.
    pub skipped: usize,
    /// Network totals for the poll.
    pub summary: FeedSummary,
}

/// Totals for a continuous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles that completed.
    pub cycles: u64,
    /// Cycles that failed.
    pub failures: u64,
    /// Wall time spent in the loop.
    pub elapsed: Duration,
}

/// Errors that abort a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Failed to fetch station status: {0}")]
    Fetch(#[source] dockwatch_core::Error),
    #[error("Storage failure: {0}")]
    Storage(#[from] dockwatch_store::Error),
    #[error("Failed to update zero-bike periods: {0}")]
    Tracking(#[source] dockwatch_core::Error),
    #[error("Failed to aggregate daily stats: {0}")]
    Aggregation(#[source] dockwatch_core::Error),
    #[error("Cycle cancelled")]
    Cancelled,
}

/// Per-station failure inside a cycle.
enum StationError {
    /// The station is skipped; the rest of the cycle proceeds.
    OutOfOrder(dockwatch_core::Error),
    Cycle(CycleError),
}

impl From<dockwatch_store::Error> for StationError {
    fn from(err: dockwatch_store::Error) -> Self {
        StationError::Cycle(CycleError::Storage(err))
    }
}

impl From<dockwatch_core::Error> for StationError {
    fn from(err: dockwatch_core::Error) -> Self {
        match err {
            dockwatch_core::Error::OutOfOrderInput { .. } => StationError::OutOfOrder(err),
            other => StationError::Cycle(CycleError::Tracking(other)),
        }
    }
}

enum StationOutcome {
    Duplicate,
    Stored(Transition),
}

/// Drives poll cycles against a feed and a store.
pub struct Collector<F> {
    store: Store,
    feed: F,
    tracker: ZeroBikeTracker,
    options: CollectorOptions,
}

impl<F: StationFeed> Collector<F> {
    /// Create a collector, resuming tracker state from the store.
    pub fn new(store: Store, feed: F, options: CollectorOptions) -> Result<Self, CycleError> {
        let tracker = ZeroBikeTracker::seed(&store, options.aggregator.zero_bike_threshold)
            .map_err(CycleError::Tracking)?;
        debug!("Stations with at most {} bikes count as empty", tracker.zero_threshold());
        if tracker.open_count() > 0 {
            info!(
                "Resuming {} open zero-bike period(s) across {} known stations",
                tracker.open_count(),
                tracker.station_count()
            );
        }
        Ok(Self {
            store,
            feed,
            tracker,
            options,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current tracker state.
    pub fn tracker(&self) -> &ZeroBikeTracker {
        &self.tracker
    }

    /// The feed being polled.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Run a single poll cycle.
    ///
    /// Only the fetch can be interrupted by `cancel`; once records are in
    /// hand the write phase runs to completion.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let records = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CycleError::Cancelled),
            result = with_retry(&self.options.retry, "fetch_station_status", || {
                self.feed.fetch_station_status()
            }) => result.map_err(CycleError::Fetch)?,
        };

        let summary = FeedSummary::from_records(&records);
        info!(
            source = self.feed.source(),
            "Fetched {} stations: {} bikes available, {} empty",
            summary.total_stations,
            summary.total_bikes,
            summary.empty_stations
        );

        let report = self.write_cycle(&records, summary)?;
        info!(
            stored = report.stored,
            duplicates = report.duplicates,
            opened = report.opened,
            closed = report.closed,
            skipped = report.skipped,
            "Cycle complete, {} open zero-bike periods",
            self.tracker.open_count()
        );
        Ok(report)
    }

    fn write_cycle(
        &mut self,
        records: &[StationStatus],
        summary: FeedSummary,
    ) -> Result<CycleReport, CycleError> {
        let mut staged = self.tracker.clone();
        let mut report = CycleReport {
            timestamp: records.first().map(|r| r.timestamp),
            fetched: records.len(),
            summary,
            ..CycleReport::default()
        };

        self.store.transaction(|store| {
            for record in records {
                let outcome = store.savepoint(|store| {
                    store.upsert_station(
                        &record.station_id,
                        record.name.as_deref(),
                        record.capacity,
                        record.timestamp,
                    )?;
                    let snapshot = record.to_snapshot();
                    if !store.insert_snapshot(&snapshot)? {
                        return Ok(StationOutcome::Duplicate);
                    }
                    let transition = staged.process(store, &snapshot)?;
                    Ok::<_, StationError>(StationOutcome::Stored(transition))
                });

                match outcome {
                    Ok(StationOutcome::Duplicate) => {
                        debug!(station_id = %record.station_id, timestamp = %record.timestamp, "Snapshot already recorded");
                        report.duplicates += 1;
                    }
                    Ok(StationOutcome::Stored(transition)) => {
                        report.stored += 1;
                        match transition {
                            Transition::Opened(_) => report.opened += 1,
                            Transition::Closed(_) => report.closed += 1,
                            Transition::Continued | Transition::Idle => {}
                        }
                    }
                    Err(StationError::OutOfOrder(e)) => {
                        warn!(station_id = %record.station_id, timestamp = %record.timestamp, error = %e, "Skipping station");
                        report.skipped += 1;
                    }
                    Err(StationError::Cycle(e)) => {
                        error!(station_id = %record.station_id, timestamp = %record.timestamp, error = %e, "Aborting cycle");
                        return Err(e);
                    }
                }
            }
            Ok::<_, CycleError>(())
        })?;

        self.tracker = staged;
        Ok(report)
    }

    /// Aggregate every station for `date`, as of now.
    pub fn aggregate(&self, date: Date) -> Result<AggregationSummary, CycleError> {
        self.aggregator()
            .aggregate_all(date)
            .map_err(CycleError::Aggregation)
    }

    /// Today's date in the reference timezone.
    pub fn today(&self) -> Date {
        self.aggregator().today()
    }

    fn aggregator(&self) -> DailyAggregator<'_, Store> {
        DailyAggregator::new(&self.store, self.options.aggregator)
    }

    /// Poll every `interval` until `cancel` fires or `duration` elapses.
    ///
    /// Failed cycles are logged and the loop continues. When the local date
    /// changes, the previous day is aggregated; on exit, today is aggregated.
    pub async fn run_continuous(
        &mut self,
        interval: Duration,
        duration: Option<Duration>,
        cancel: CancellationToken,
    ) -> RunSummary {
        let started = Instant::now();
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = RunSummary::default();
        let mut consecutive_failures = 0u32;
        let mut current_day = self.today();

        info!(
            "Starting continuous collection every {}s{}",
            interval.as_secs(),
            duration
                .map(|d| format!(" for {:.1}h", d.as_secs_f64() / 3600.0))
                .unwrap_or_default()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            if duration.is_some_and(|d| started.elapsed() >= d) {
                info!("Reached configured run duration");
                break;
            }

            match self.run_once(&cancel).await {
                Ok(_) => {
                    summary.cycles += 1;
                    if consecutive_failures > 0 {
                        info!("Collection recovered after {} failed cycle(s)", consecutive_failures);
                    }
                    consecutive_failures = 0;
                }
                Err(CycleError::Cancelled) => break,
                Err(e) => {
                    summary.failures += 1;
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("Cycle failed: {} (attempt {})", e, consecutive_failures);
                    } else {
                        error!("Cycle failed {} times in a row: {}", consecutive_failures, e);
                    }
                }
            }

            let today = self.today();
            if today != current_day {
                info!("Date changed to {}, aggregating {}", today, current_day);
                if let Err(e) = self.aggregate(current_day) {
                    error!(date = %current_day, "{}", e);
                }
                current_day = today;
            }
        }

        info!("Stopping collection, aggregating {}", current_day);
        if let Err(e) = self.aggregate(current_day) {
            error!(date = %current_day, "{}", e);
        }

        summary.elapsed = started.elapsed();
        info!(
            cycles = summary.cycles,
            failures = summary.failures,
            "Collection ran for {:.2}h",
            summary.elapsed.as_secs_f64() / 3600.0
        );
        summary
    }
}
