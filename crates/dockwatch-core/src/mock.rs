//! In-memory feed and store for testing.
//!
//! [`MockFeed`] implements [`StationFeed`] with queued responses and failure
//! injection. [`MemoryStore`] implements the three repository traits over
//! plain vectors, with the same uniqueness rules as the SQLite store, so the
//! tracker, aggregator and collector can be tested without a database.
//!
//! # Example
//!
//! ```
//! use dockwatch_core::{MockFeed, StationFeed};
//! use time::macros::datetime;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ts = datetime!(2024-05-01 10:00 UTC);
//!     let feed = MockFeed::new();
//!     feed.push_response(vec![MockFeed::station("S1", 4, ts)]);
//!
//!     let stations = feed.fetch_station_status().await.unwrap();
//!     assert_eq!(stations[0].bikes_available, 4);
//!     assert_eq!(feed.call_count(), 1);
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use dockwatch_types::{DailyStat, StationSnapshot, StationStatus, ZeroBikePeriod};

use crate::error::{Error, FetchError, Result};
use crate::traits::{DailyStatStore, PeriodStore, SnapshotLog, StationFeed};

/// A scripted station feed.
///
/// Queued responses are returned in order; once the queue is empty the last
/// response set with [`MockFeed::set_stations`] is repeated.
#[derive(Debug, Default)]
pub struct MockFeed {
    queue: Mutex<VecDeque<Vec<StationStatus>>>,
    fallback: Mutex<Vec<StationStatus>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
}

impl MockFeed {
    /// Create a feed with no stations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a renting station record.
    pub fn station(station_id: &str, bikes_available: u32, timestamp: OffsetDateTime) -> StationStatus {
        StationStatus {
            station_id: station_id.to_string(),
            name: Some(format!("Station {station_id}")),
            bikes_available,
            docks_available: None,
            capacity: None,
            is_renting: true,
            is_returning: true,
            last_reported: None,
            timestamp,
        }
    }

    /// Queue a response for the next call.
    pub fn push_response(&self, stations: Vec<StationStatus>) {
        lock(&self.queue).push_back(stations);
    }

    /// Set the response returned when the queue is empty.
    pub fn set_stations(&self, stations: Vec<StationStatus>) {
        *lock(&self.fallback) = stations;
    }

    /// Fail every call with a non-retryable error.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` calls with a retryable HTTP 503.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StationFeed for MockFeed {
    async fn fetch_station_status(&self) -> Result<Vec<StationStatus>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(FetchError::InvalidResponse("mock failure".to_string()).into());
        }

        let transient = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(FetchError::Status {
                url: self.source().to_string(),
                status: 503,
            }
            .into());
        }

        if let Some(next) = lock(&self.queue).pop_front() {
            return Ok(next);
        }
        Ok(lock(&self.fallback).clone())
    }

    fn source(&self) -> &str {
        "mock://station_status"
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshots: Vec<StationSnapshot>,
    periods: Vec<ZeroBikePeriod>,
    stats: BTreeMap<(String, Date), DailyStat>,
    next_period_id: i64,
}

/// Repository traits over in-memory collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        lock(&self.inner).snapshots.len()
    }

    /// Every period, ordered by start.
    pub fn all_periods(&self) -> Vec<ZeroBikePeriod> {
        let mut periods = lock(&self.inner).periods.clone();
        periods.sort_by_key(|p| (p.start_timestamp, p.id));
        periods
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage(operation, "injected write failure"));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SnapshotLog for MemoryStore {
    fn append_snapshot(&self, snapshot: &StationSnapshot) -> Result<bool> {
        self.check_write("append_snapshot")?;
        let mut inner = lock(&self.inner);
        let duplicate = inner
            .snapshots
            .iter()
            .any(|s| s.station_id == snapshot.station_id && s.timestamp == snapshot.timestamp);
        if duplicate {
            return Ok(false);
        }
        inner.snapshots.push(snapshot.clone());
        Ok(true)
    }

    fn snapshots_between(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<StationSnapshot>> {
        let mut found: Vec<_> = lock(&self.inner)
            .snapshots
            .iter()
            .filter(|s| s.station_id == station_id && s.timestamp >= start && s.timestamp < end)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.timestamp);
        Ok(found)
    }

    fn latest_snapshots(&self) -> Result<Vec<StationSnapshot>> {
        let inner = lock(&self.inner);
        let mut latest: BTreeMap<&str, &StationSnapshot> = BTreeMap::new();
        for snapshot in &inner.snapshots {
            let entry = latest.entry(snapshot.station_id.as_str()).or_insert(snapshot);
            if snapshot.timestamp > entry.timestamp {
                *entry = snapshot;
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    fn stations_between(&self, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<String>> {
        let mut ids: Vec<String> = lock(&self.inner)
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp < end)
            .map(|s| s.station_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl PeriodStore for MemoryStore {
    fn open_period(&self, station_id: &str, start: OffsetDateTime) -> Result<ZeroBikePeriod> {
        self.check_write("open_period")?;
        let mut inner = lock(&self.inner);
        if inner
            .periods
            .iter()
            .any(|p| p.station_id == station_id && p.is_open())
        {
            return Err(Error::storage(
                "open_period",
                format!("station {station_id} already has an open period"),
            ));
        }
        inner.next_period_id += 1;
        let period = ZeroBikePeriod::open(inner.next_period_id, station_id, start);
        inner.periods.push(period.clone());
        Ok(period)
    }

    fn close_period(&self, period_id: i64, end: OffsetDateTime, duration_seconds: i64) -> Result<()> {
        self.check_write("close_period")?;
        let mut inner = lock(&self.inner);
        let period = inner
            .periods
            .iter_mut()
            .find(|p| p.id == period_id && p.is_open())
            .ok_or_else(|| Error::storage("close_period", format!("no open period with id {period_id}")))?;
        period.end_timestamp = Some(end);
        period.duration_seconds = Some(duration_seconds);
        Ok(())
    }

    fn find_open_period(&self, station_id: &str) -> Result<Option<ZeroBikePeriod>> {
        Ok(lock(&self.inner)
            .periods
            .iter()
            .find(|p| p.station_id == station_id && p.is_open())
            .cloned())
    }

    fn open_periods(&self) -> Result<Vec<ZeroBikePeriod>> {
        Ok(lock(&self.inner)
            .periods
            .iter()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    fn periods_overlapping(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ZeroBikePeriod>> {
        let mut found: Vec<_> = lock(&self.inner)
            .periods
            .iter()
            .filter(|p| {
                p.station_id == station_id
                    && p.start_timestamp < end
                    && p.end_timestamp
                        .is_none_or(|e| e > start || p.start_timestamp >= start)
            })
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.start_timestamp, p.id));
        Ok(found)
    }
}

impl DailyStatStore for MemoryStore {
    fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<()> {
        self.check_write("upsert_daily_stat")?;
        lock(&self.inner)
            .stats
            .insert((stat.station_id.clone(), stat.date), stat.clone());
        Ok(())
    }

    fn daily_stat(&self, station_id: &str, date: Date) -> Result<Option<DailyStat>> {
        Ok(lock(&self.inner)
            .stats
            .get(&(station_id.to_string(), date))
            .cloned())
    }

    fn daily_stats_for(&self, date: Date) -> Result<Vec<DailyStat>> {
        let mut stats: Vec<_> = lock(&self.inner)
            .stats
            .values()
            .filter(|s| s.date == date)
            .cloned()
            .collect();
        stats.sort_by(|a, b| {
            b.zero_bike_seconds
                .cmp(&a.zero_bike_seconds)
                .then_with(|| a.station_id.cmp(&b.station_id))
        });
        Ok(stats)
    }
}
