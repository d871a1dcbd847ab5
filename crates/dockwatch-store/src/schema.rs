//! Database schema and migrations.
//!
//! `station_snapshots`, `zero_bike_periods` and `daily_stats` are read by
//! external reporting tools and direct SQL analytics; their column names and
//! types must not change. Timestamps are INTEGER unix seconds (UTC), dates
//! are TEXT `YYYY-MM-DD`.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    match version {
        0 => {
            create_schema_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Station registry, refreshed from feed metadata every cycle
        CREATE TABLE IF NOT EXISTS stations (
            station_id TEXT PRIMARY KEY,
            name TEXT,
            capacity INTEGER,
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL
        );

        -- Append-only observation log
        CREATE TABLE IF NOT EXISTS station_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            bikes_available INTEGER NOT NULL CHECK (bikes_available >= 0),
            capacity INTEGER,
            docks_available INTEGER,
            is_renting INTEGER NOT NULL DEFAULT 1,
            is_returning INTEGER NOT NULL DEFAULT 1,
            last_reported INTEGER,
            UNIQUE(station_id, timestamp)
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
            ON station_snapshots(timestamp);

        CREATE TABLE IF NOT EXISTS zero_bike_periods (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            start_timestamp INTEGER NOT NULL,
            end_timestamp INTEGER,
            duration_seconds INTEGER,
            CHECK (end_timestamp IS NULL OR end_timestamp >= start_timestamp),
            CHECK ((end_timestamp IS NULL) = (duration_seconds IS NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_periods_station_start
            ON zero_bike_periods(station_id, start_timestamp);
        -- At most one open period per station
        CREATE UNIQUE INDEX IF NOT EXISTS idx_periods_one_open
            ON zero_bike_periods(station_id) WHERE end_timestamp IS NULL;

        CREATE TABLE IF NOT EXISTS daily_stats (
            station_id TEXT NOT NULL,
            date TEXT NOT NULL,
            snapshot_count INTEGER NOT NULL,
            min_bikes INTEGER NOT NULL,
            max_bikes INTEGER NOT NULL,
            avg_bikes REAL NOT NULL,
            zero_bike_seconds INTEGER NOT NULL,
            longest_zero_period_seconds INTEGER NOT NULL,
            num_zero_periods INTEGER NOT NULL DEFAULT 0,
            low_bike_seconds INTEGER NOT NULL DEFAULT 0,
            availability_percentage REAL NOT NULL DEFAULT 100,
            PRIMARY KEY (station_id, date)
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "schema_version",
            "stations",
            "station_snapshots",
            "zero_bike_periods",
            "daily_stats",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Re-running is a no-op
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        let err = initialize(&conn).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSchema { found, supported: SCHEMA_VERSION } if found == SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn test_one_open_period_per_station() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        conn.execute(
            "INSERT INTO zero_bike_periods (station_id, start_timestamp) VALUES ('S1', 100)",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO zero_bike_periods (station_id, start_timestamp) VALUES ('S1', 200)",
            [],
        );
        assert!(second.is_err());

        // A closed period does not count
        conn.execute(
            "INSERT INTO zero_bike_periods (station_id, start_timestamp, end_timestamp, duration_seconds)
             VALUES ('S1', 10, 50, 40)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_period_end_before_start_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO zero_bike_periods (station_id, start_timestamp, end_timestamp, duration_seconds)
             VALUES ('S1', 100, 50, -50)",
            [],
        );
        assert!(result.is_err());
    }
}
