//! Main store implementation.

use std::io::Write;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use dockwatch_core::{DailyStatStore, PeriodStore, SnapshotLog};
use dockwatch_types::{DailyStat, StationSnapshot, ZeroBikePeriod, format_date, parse_date};

use crate::error::{Error, Result};
use crate::models::{StoreCounts, StoredStation};
use crate::queries::{SNAPSHOT_COLUMNS, SnapshotQuery};
use crate::schema;

const PERIOD_COLUMNS: &str = "id, station_id, start_timestamp, end_timestamp, duration_seconds";
const STAT_COLUMNS: &str = "station_id, date, snapshot_count, min_bikes, max_bikes, avg_bikes, \
     zero_bike_seconds, longest_zero_period_seconds, num_zero_periods, low_bike_seconds, \
     availability_percentage";

/// SQLite-based store for station history.
///
/// Implements the repository traits from `dockwatch-core`, so the tracker
/// and aggregator run directly against it.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL lets report/aggregate processes read while the collector writes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Store) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let tx = self.conn.unchecked_transaction().map_err(Error::from)?;
        let value = f(self)?;
        tx.commit().map_err(Error::from)?;
        Ok(value)
    }

    /// Run `f` inside a savepoint nested in the current transaction.
    ///
    /// On `Err` only the writes made by `f` are undone; the outer transaction
    /// stays usable.
    pub fn savepoint<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Store) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.conn
            .execute_batch("SAVEPOINT dockwatch_station")
            .map_err(Error::from)?;

        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE dockwatch_station")
                    .map_err(Error::from)?;
                Ok(value)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO dockwatch_station; RELEASE dockwatch_station")
                    .map_err(Error::from)?;
                Err(e)
            }
        }
    }

    /// Row counts across all tables.
    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        };

        Ok(StoreCounts {
            stations: count("SELECT COUNT(*) FROM stations")?,
            snapshots: count("SELECT COUNT(*) FROM station_snapshots")?,
            open_periods: count("SELECT COUNT(*) FROM zero_bike_periods WHERE end_timestamp IS NULL")?,
            closed_periods: count(
                "SELECT COUNT(*) FROM zero_bike_periods WHERE end_timestamp IS NOT NULL",
            )?,
            daily_stats: count("SELECT COUNT(*) FROM daily_stats")?,
        })
    }
}

// Station registry
impl Store {
    /// Record that a station was seen at `seen_at`.
    ///
    /// Name and capacity are only overwritten when the feed supplies them.
    pub fn upsert_station(
        &self,
        station_id: &str,
        name: Option<&str>,
        capacity: Option<u32>,
        seen_at: OffsetDateTime,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stations (station_id, name, capacity, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(station_id) DO UPDATE SET
                name = COALESCE(?2, name),
                capacity = COALESCE(?3, capacity),
                last_seen = MAX(last_seen, ?4)",
            params![station_id, name, capacity, seen_at.unix_timestamp()],
        )?;
        Ok(())
    }

    /// Get a station by ID.
    pub fn get_station(&self, station_id: &str) -> Result<Option<StoredStation>> {
        let station = self
            .conn
            .query_row(
                "SELECT station_id, name, capacity, first_seen, last_seen
                 FROM stations WHERE station_id = ?",
                [station_id],
                station_from_row,
            )
            .optional()?;
        Ok(station)
    }

    /// List all stations, ordered by ID.
    pub fn list_stations(&self) -> Result<Vec<StoredStation>> {
        let mut stmt = self.conn.prepare(
            "SELECT station_id, name, capacity, first_seen, last_seen
             FROM stations ORDER BY station_id",
        )?;
        let stations = stmt
            .query_map([], station_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stations)
    }
}

// Snapshot operations
impl Store {
    /// Insert a snapshot; returns `false` if one already exists for the same
    /// station and timestamp.
    pub fn insert_snapshot(&self, snapshot: &StationSnapshot) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO station_snapshots
             (station_id, timestamp, bikes_available, capacity, docks_available,
              is_renting, is_returning, last_reported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot.station_id,
                snapshot.timestamp.unix_timestamp(),
                snapshot.bikes_available,
                snapshot.capacity,
                snapshot.docks_available,
                snapshot.is_renting,
                snapshot.is_returning,
                snapshot.last_reported.map(OffsetDateTime::unix_timestamp),
            ],
        )?;
        if changed == 0 {
            debug!(
                station_id = %snapshot.station_id,
                timestamp = %snapshot.timestamp,
                "duplicate snapshot ignored"
            );
        }
        Ok(changed > 0)
    }

    /// Query snapshots with filters.
    pub fn query_snapshots(&self, query: &SnapshotQuery) -> Result<Vec<StationSnapshot>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params_ref.as_slice(), snapshot_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// Count snapshots, optionally for one station.
    pub fn count_snapshots(&self, station_id: Option<&str>) -> Result<u64> {
        let count: i64 = match station_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM station_snapshots WHERE station_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM station_snapshots", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Write matching snapshots as CSV with a header row.
    ///
    /// Returns the number of rows written.
    pub fn export_snapshots_csv<W: Write>(&self, query: &SnapshotQuery, writer: W) -> Result<usize> {
        let snapshots = self.query_snapshots(query)?;
        let mut csv = csv::Writer::from_writer(writer);
        for snapshot in &snapshots {
            csv.serialize(snapshot)?;
        }
        csv.flush()?;
        info!("Exported {} snapshots", snapshots.len());
        Ok(snapshots.len())
    }
}

// Zero-bike period operations
impl Store {
    /// Insert a new open period.
    pub fn insert_open_period(&self, station_id: &str, start: OffsetDateTime) -> Result<ZeroBikePeriod> {
        self.conn.execute(
            "INSERT INTO zero_bike_periods (station_id, start_timestamp) VALUES (?1, ?2)",
            params![station_id, start.unix_timestamp()],
        )?;
        Ok(ZeroBikePeriod::open(
            self.conn.last_insert_rowid(),
            station_id,
            start,
        ))
    }

    /// Close an open period.
    pub fn update_period_end(&self, period_id: i64, end: OffsetDateTime, duration_seconds: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE zero_bike_periods SET end_timestamp = ?2, duration_seconds = ?3
             WHERE id = ?1 AND end_timestamp IS NULL",
            params![period_id, end.unix_timestamp(), duration_seconds],
        )?;
        if changed == 0 {
            return Err(Error::PeriodNotOpen(period_id));
        }
        Ok(())
    }

    /// Periods for a station, newest first.
    pub fn periods_for_station(&self, station_id: &str, limit: Option<u32>) -> Result<Vec<ZeroBikePeriod>> {
        let mut sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM zero_bike_periods WHERE station_id = ?
             ORDER BY start_timestamp DESC, id DESC"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        self.query_periods(&sql, [station_id])
    }

    fn query_periods<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<ZeroBikePeriod>> {
        let mut stmt = self.conn.prepare(sql)?;
        let periods = stmt
            .query_map(params, period_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(periods)
    }
}

// Daily stat operations
impl Store {
    /// Insert or replace a daily stat row.
    pub fn upsert_stat(&self, stat: &DailyStat) -> Result<()> {
        self.conn.execute(
            "INSERT INTO daily_stats
             (station_id, date, snapshot_count, min_bikes, max_bikes, avg_bikes,
              zero_bike_seconds, longest_zero_period_seconds, num_zero_periods,
              low_bike_seconds, availability_percentage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(station_id, date) DO UPDATE SET
                snapshot_count = excluded.snapshot_count,
                min_bikes = excluded.min_bikes,
                max_bikes = excluded.max_bikes,
                avg_bikes = excluded.avg_bikes,
                zero_bike_seconds = excluded.zero_bike_seconds,
                longest_zero_period_seconds = excluded.longest_zero_period_seconds,
                num_zero_periods = excluded.num_zero_periods,
                low_bike_seconds = excluded.low_bike_seconds,
                availability_percentage = excluded.availability_percentage",
            params![
                stat.station_id,
                format_date(stat.date),
                stat.snapshot_count,
                stat.min_bikes,
                stat.max_bikes,
                stat.avg_bikes,
                stat.zero_bike_seconds,
                stat.longest_zero_period_seconds,
                stat.num_zero_periods,
                stat.low_bike_seconds,
                stat.availability_percentage,
            ],
        )?;
        Ok(())
    }

    /// Stats rows for a date, most zero-bike time first.
    pub fn stats_for_date(&self, date: Date) -> Result<Vec<DailyStat>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STAT_COLUMNS} FROM daily_stats WHERE date = ?
             ORDER BY zero_bike_seconds DESC, station_id"
        ))?;
        let stats = stmt
            .query_map([format_date(date)], stat_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    /// The stat row for a station and date.
    pub fn get_stat(&self, station_id: &str, date: Date) -> Result<Option<DailyStat>> {
        let stat = self
            .conn
            .query_row(
                &format!("SELECT {STAT_COLUMNS} FROM daily_stats WHERE station_id = ?1 AND date = ?2"),
                params![station_id, format_date(date)],
                stat_from_row,
            )
            .optional()?;
        Ok(stat)
    }
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|secs| {
            OffsetDateTime::from_unix_timestamp(secs)
                .map_err(|e| conversion_error(idx, Type::Integer, e))
        })
        .transpose()
}

fn station_from_row(row: &Row<'_>) -> rusqlite::Result<StoredStation> {
    Ok(StoredStation {
        station_id: row.get(0)?,
        name: row.get(1)?,
        capacity: row.get(2)?,
        first_seen: timestamp_at(row, 3)?,
        last_seen: timestamp_at(row, 4)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<StationSnapshot> {
    Ok(StationSnapshot {
        station_id: row.get(0)?,
        timestamp: timestamp_at(row, 1)?,
        bikes_available: row.get(2)?,
        capacity: row.get(3)?,
        docks_available: row.get(4)?,
        is_renting: row.get(5)?,
        is_returning: row.get(6)?,
        last_reported: optional_timestamp_at(row, 7)?,
    })
}

fn period_from_row(row: &Row<'_>) -> rusqlite::Result<ZeroBikePeriod> {
    Ok(ZeroBikePeriod {
        id: row.get(0)?,
        station_id: row.get(1)?,
        start_timestamp: timestamp_at(row, 2)?,
        end_timestamp: optional_timestamp_at(row, 3)?,
        duration_seconds: row.get(4)?,
    })
}

fn stat_from_row(row: &Row<'_>) -> rusqlite::Result<DailyStat> {
    let date: String = row.get(1)?;
    Ok(DailyStat {
        station_id: row.get(0)?,
        date: parse_date(&date).map_err(|e| conversion_error(1, Type::Text, e))?,
        snapshot_count: row.get(2)?,
        min_bikes: row.get(3)?,
        max_bikes: row.get(4)?,
        avg_bikes: row.get(5)?,
        zero_bike_seconds: row.get(6)?,
        longest_zero_period_seconds: row.get(7)?,
        num_zero_periods: row.get(8)?,
        low_bike_seconds: row.get(9)?,
        availability_percentage: row.get(10)?,
    })
}

fn storage(operation: &'static str) -> impl FnOnce(Error) -> dockwatch_core::Error {
    move |err| {
        warn!(operation, error = %err, "storage operation failed");
        dockwatch_core::Error::storage(operation, err)
    }
}

impl SnapshotLog for Store {
    fn append_snapshot(&self, snapshot: &StationSnapshot) -> dockwatch_core::Result<bool> {
        self.insert_snapshot(snapshot).map_err(storage("append_snapshot"))
    }

    fn snapshots_between(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> dockwatch_core::Result<Vec<StationSnapshot>> {
        let query = SnapshotQuery::new()
            .station(station_id)
            .since(start)
            .until(end)
            .oldest_first();
        self.query_snapshots(&query).map_err(storage("snapshots_between"))
    }

    fn latest_snapshots(&self) -> dockwatch_core::Result<Vec<StationSnapshot>> {
        let run = || -> Result<Vec<StationSnapshot>> {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM station_snapshots s
                 WHERE timestamp = (
                     SELECT MAX(timestamp) FROM station_snapshots
                     WHERE station_id = s.station_id
                 )
                 ORDER BY station_id"
            ))?;
            let snapshots = stmt
                .query_map([], snapshot_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(snapshots)
        };
        run().map_err(storage("latest_snapshots"))
    }

    fn stations_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> dockwatch_core::Result<Vec<String>> {
        let run = || -> Result<Vec<String>> {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT station_id FROM station_snapshots
                 WHERE timestamp >= ?1 AND timestamp < ?2
                 ORDER BY station_id",
            )?;
            let ids = stmt
                .query_map(params![start.unix_timestamp(), end.unix_timestamp()], |row| {
                    row.get(0)
                })?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        };
        run().map_err(storage("stations_between"))
    }
}

impl PeriodStore for Store {
    fn open_period(&self, station_id: &str, start: OffsetDateTime) -> dockwatch_core::Result<ZeroBikePeriod> {
        self.insert_open_period(station_id, start)
            .map_err(storage("open_period"))
    }

    fn close_period(
        &self,
        period_id: i64,
        end: OffsetDateTime,
        duration_seconds: i64,
    ) -> dockwatch_core::Result<()> {
        self.update_period_end(period_id, end, duration_seconds)
            .map_err(storage("close_period"))
    }

    fn find_open_period(&self, station_id: &str) -> dockwatch_core::Result<Option<ZeroBikePeriod>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM zero_bike_periods
             WHERE station_id = ?1 AND end_timestamp IS NULL"
        );
        self.query_periods(&sql, [station_id])
            .map(|mut periods| periods.pop())
            .map_err(storage("find_open_period"))
    }

    fn open_periods(&self) -> dockwatch_core::Result<Vec<ZeroBikePeriod>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM zero_bike_periods
             WHERE end_timestamp IS NULL ORDER BY station_id"
        );
        self.query_periods(&sql, []).map_err(storage("open_periods"))
    }

    fn periods_overlapping(
        &self,
        station_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> dockwatch_core::Result<Vec<ZeroBikePeriod>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM zero_bike_periods
             WHERE station_id = ?1
               AND start_timestamp < ?3
               AND (end_timestamp IS NULL OR end_timestamp > ?2 OR start_timestamp >= ?2)
             ORDER BY start_timestamp, id"
        );
        let start = start.unix_timestamp();
        let end = end.unix_timestamp();
        self.query_periods(&sql, params![station_id, start, end])
            .map_err(storage("periods_overlapping"))
    }
}

impl DailyStatStore for Store {
    fn upsert_daily_stat(&self, stat: &DailyStat) -> dockwatch_core::Result<()> {
        self.upsert_stat(stat).map_err(storage("upsert_daily_stat"))
    }

    fn daily_stat(&self, station_id: &str, date: Date) -> dockwatch_core::Result<Option<DailyStat>> {
        self.get_stat(station_id, date).map_err(storage("daily_stat"))
    }

    fn daily_stats_for(&self, date: Date) -> dockwatch_core::Result<Vec<DailyStat>> {
        self.stats_for_date(date).map_err(storage("daily_stats_for"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockwatch_core::{AggregatorOptions, DailyAggregator, ZeroBikeTracker};
    use time::macros::{date, datetime};

    fn snap(id: &str, ts: OffsetDateTime, bikes: u32) -> StationSnapshot {
        StationSnapshot::new(id, ts, bikes)
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = Store::open(&path).unwrap();
        store
            .insert_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 3))
            .unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_snapshots(None).unwrap(), 1);
    }

    #[test]
    fn test_upsert_station() {
        let store = Store::open_in_memory().unwrap();
        let first = datetime!(2024-05-01 10:00 UTC);
        let later = datetime!(2024-05-01 11:00 UTC);

        store.upsert_station("S1", Some("Royal Parade"), Some(12), first).unwrap();
        store.upsert_station("S1", None, None, later).unwrap();

        let station = store.get_station("S1").unwrap().unwrap();
        assert_eq!(station.display_name(), "Royal Parade");
        assert_eq!(station.capacity, Some(12));
        assert_eq!(station.first_seen, first);
        assert_eq!(station.last_seen, later);
        assert_eq!(store.list_stations().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_and_dedup() {
        let store = Store::open_in_memory().unwrap();
        let mut s = snap("S1", datetime!(2024-05-01 10:00 UTC), 4).with_capacity(10);
        s.docks_available = Some(6);
        s.is_returning = false;
        s.last_reported = Some(datetime!(2024-05-01 09:59 UTC));

        assert!(store.insert_snapshot(&s).unwrap());
        assert!(!store.insert_snapshot(&s).unwrap());

        let stored = store.query_snapshots(&SnapshotQuery::new()).unwrap();
        assert_eq!(stored, vec![s]);
    }

    #[test]
    fn test_query_snapshots_window() {
        let store = Store::open_in_memory().unwrap();
        for (id, ts) in [
            ("S1", datetime!(2024-04-30 23:59:59 UTC)),
            ("S1", datetime!(2024-05-01 00:00 UTC)),
            ("S1", datetime!(2024-05-01 12:00 UTC)),
            ("S1", datetime!(2024-05-02 00:00 UTC)),
            ("S2", datetime!(2024-05-01 12:00 UTC)),
        ] {
            store.insert_snapshot(&snap(id, ts, 1)).unwrap();
        }

        let day = store
            .snapshots_between(
                "S1",
                datetime!(2024-05-01 00:00 UTC),
                datetime!(2024-05-02 00:00 UTC),
            )
            .unwrap();
        assert_eq!(day.len(), 2);
        assert!(day[0].timestamp < day[1].timestamp);

        let stations = store
            .stations_between(
                datetime!(2024-05-01 00:00 UTC),
                datetime!(2024-05-02 00:00 UTC),
            )
            .unwrap();
        assert_eq!(stations, ["S1", "S2"]);

        let newest = store.query_snapshots(&SnapshotQuery::new().station("S1").limit(1)).unwrap();
        assert_eq!(newest[0].timestamp, datetime!(2024-05-02 00:00 UTC));
    }

    #[test]
    fn test_latest_snapshots() {
        let store = Store::open_in_memory().unwrap();
        store.insert_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 1)).unwrap();
        store.insert_snapshot(&snap("S1", datetime!(2024-05-01 10:05 UTC), 2)).unwrap();
        store.insert_snapshot(&snap("S2", datetime!(2024-05-01 09:00 UTC), 3)).unwrap();

        let latest = store.latest_snapshots().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].bikes_available, 2);
        assert_eq!(latest[1].station_id, "S2");
    }

    #[test]
    fn test_period_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let period = store.open_period("S1", datetime!(2024-05-01 10:05 UTC)).unwrap();
        assert!(period.is_open());

        // second open period for the same station is rejected
        let dup = store.open_period("S1", datetime!(2024-05-01 10:10 UTC));
        assert!(matches!(dup, Err(dockwatch_core::Error::Storage { .. })));

        assert_eq!(store.find_open_period("S1").unwrap(), Some(period.clone()));
        store
            .close_period(period.id, datetime!(2024-05-01 10:20 UTC), 900)
            .unwrap();
        assert!(store.find_open_period("S1").unwrap().is_none());
        assert!(store.close_period(period.id, datetime!(2024-05-01 10:30 UTC), 1500).is_err());

        let periods = store.periods_for_station("S1", None).unwrap();
        assert_eq!(periods[0].duration_seconds, Some(900));
        assert_eq!(periods[0].end_timestamp, Some(datetime!(2024-05-01 10:20 UTC)));
    }

    #[test]
    fn test_periods_overlapping() {
        let store = Store::open_in_memory().unwrap();
        let ended_at_midnight = store.open_period("S1", datetime!(2024-04-30 22:00 UTC)).unwrap();
        store
            .close_period(ended_at_midnight.id, datetime!(2024-05-01 00:00 UTC), 7200)
            .unwrap();
        let cross = store.open_period("S1", datetime!(2024-05-01 23:00 UTC)).unwrap();
        store
            .close_period(cross.id, datetime!(2024-05-02 01:00 UTC), 7200)
            .unwrap();
        store.open_period("S1", datetime!(2024-05-02 05:00 UTC)).unwrap();

        let day = store
            .periods_overlapping(
                "S1",
                datetime!(2024-05-02 00:00 UTC),
                datetime!(2024-05-03 00:00 UTC),
            )
            .unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].id, cross.id);
        assert!(day[1].is_open());
    }

    #[test]
    fn test_daily_stat_upsert() {
        let store = Store::open_in_memory().unwrap();
        let mut stat = DailyStat {
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
            availability_percentage: 98.95833333333333,
        };
        store.upsert_daily_stat(&stat).unwrap();
        stat.snapshot_count = 5;
        store.upsert_daily_stat(&stat).unwrap();

        assert_eq!(store.daily_stat("S1", date!(2024-05-01)).unwrap(), Some(stat.clone()));
        assert_eq!(store.daily_stats_for(date!(2024-05-01)).unwrap(), vec![stat]);
        assert!(store.daily_stats_for(date!(2024-05-02)).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();

        let result: std::result::Result<(), dockwatch_core::Error> = store.transaction(|s| {
            s.append_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 1))?;
            Err(dockwatch_core::Error::storage("test", "forced"))
        });
        assert!(result.is_err());
        assert_eq!(store.count_snapshots(None).unwrap(), 0);

        store
            .transaction(|s| s.append_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 1)))
            .unwrap();
        assert_eq!(store.count_snapshots(None).unwrap(), 1);
    }

    #[test]
    fn test_savepoint_undoes_only_inner_writes() {
        let store = Store::open_in_memory().unwrap();

        store
            .transaction(|s| -> dockwatch_core::Result<()> {
                s.append_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 1))?;
                let inner: dockwatch_core::Result<()> = s.savepoint(|s| {
                    s.append_snapshot(&snap("S2", datetime!(2024-05-01 10:00 UTC), 1))?;
                    Err(dockwatch_core::Error::storage("test", "forced"))
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();

        assert_eq!(store.count_snapshots(Some("S1")).unwrap(), 1);
        assert_eq!(store.count_snapshots(Some("S2")).unwrap(), 0);
    }

    #[test]
    fn test_export_csv() {
        let store = Store::open_in_memory().unwrap();
        store.insert_snapshot(&snap("S1", datetime!(2024-05-01 10:00 UTC), 3)).unwrap();
        store.insert_snapshot(&snap("S2", datetime!(2024-05-01 10:00 UTC), 0)).unwrap();

        let mut out = Vec::new();
        let rows = store
            .export_snapshots_csv(&SnapshotQuery::new().oldest_first(), &mut out)
            .unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "station_id,timestamp,bikes_available,capacity,docks_available,is_renting,is_returning,last_reported"
        );
        assert_eq!(lines.next().unwrap(), "S1,2024-05-01T10:00:00Z,3,,,true,true,");
    }

    #[test]
    fn test_tracker_and_aggregator_against_sqlite() {
        let store = Store::open_in_memory().unwrap();
        let mut tracker = ZeroBikeTracker::new(0);
        for (ts, bikes) in [
            (datetime!(2024-05-01 10:00 UTC), 5),
            (datetime!(2024-05-01 10:05 UTC), 0),
            (datetime!(2024-05-01 10:15 UTC), 0),
            (datetime!(2024-05-01 10:20 UTC), 3),
        ] {
            let s = snap("S1", ts, bikes);
            store.append_snapshot(&s).unwrap();
            tracker.process(&store, &s).unwrap();
        }

        let aggregator = DailyAggregator::new(&store, AggregatorOptions::default());
        let stat = aggregator
            .aggregate_at("S1", date!(2024-05-01), datetime!(2024-05-02 00:00 UTC))
            .unwrap();
        assert_eq!(stat.snapshot_count, 4);
        assert_eq!(stat.avg_bikes, 2.0);
        assert_eq!(stat.zero_bike_seconds, 900);
        assert_eq!(stat.longest_zero_period_seconds, 900);

        let seeded = ZeroBikeTracker::seed(&store, 0).unwrap();
        assert_eq!(seeded.last_timestamp("S1"), Some(datetime!(2024-05-01 10:20 UTC)));
        assert_eq!(seeded.open_count(), 0);
    }
}
