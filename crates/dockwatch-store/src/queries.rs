//! Query builder for snapshots.
//!
//! # Example
//!
//! ```
//! use dockwatch_store::{SnapshotQuery, Store};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = SnapshotQuery::new()
//!     .station("S1")
//!     .since(yesterday)
//!     .limit(50);
//! let snapshots = store.query_snapshots(&query)?;
//! # Ok::<(), dockwatch_store::Error>(())
//! ```

use time::OffsetDateTime;

pub(crate) const SNAPSHOT_COLUMNS: &str = "station_id, timestamp, bikes_available, capacity, \
     docks_available, is_renting, is_returning, last_reported";

/// Fluent query builder for station snapshots.
///
/// By default, queries return results ordered by `timestamp` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct SnapshotQuery {
    /// Filter by station ID.
    pub station_id: Option<String>,
    /// Include only snapshots at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only snapshots strictly before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl SnapshotQuery {
    /// Create a new query: all stations, no time range, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by station ID.
    pub fn station(mut self, station_id: &str) -> Self {
        self.station_id = Some(station_id.to_string());
        self
    }

    /// Filter to snapshots taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to snapshots taken before this time (exclusive).
    ///
    /// `since(day_start).until(day_end)` selects exactly one day window.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref station_id) = self.station_id {
            conditions.push("station_id = ?");
            params.push(Box::new(station_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp < ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {} FROM station_snapshots {} ORDER BY timestamp {}, station_id",
            SNAPSHOT_COLUMNS, where_clause, order
        );

        // SQLite needs a LIMIT before OFFSET
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_default_query() {
        let query = SnapshotQuery::new();
        let (where_clause, params) = query.build_where();
        assert!(where_clause.is_empty());
        assert!(params.is_empty());
        assert!(query.build_sql().contains("ORDER BY timestamp DESC"));
    }

    #[test]
    fn test_full_query() {
        let query = SnapshotQuery::new()
            .station("S1")
            .since(datetime!(2024-05-01 00:00 UTC))
            .until(datetime!(2024-05-02 00:00 UTC))
            .limit(10)
            .offset(20)
            .oldest_first();

        let (where_clause, params) = query.build_where();
        assert_eq!(
            where_clause,
            "WHERE station_id = ? AND timestamp >= ? AND timestamp < ?"
        );
        assert_eq!(params.len(), 3);

        let sql = query.build_sql();
        assert!(sql.contains("ORDER BY timestamp ASC"));
        assert!(sql.ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_offset_without_limit() {
        let sql = SnapshotQuery::new().offset(5).build_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }
}
