//! SQLite persistence for bikeshare station history.
//!
//! This crate stores the append-only snapshot log, zero-bike periods and
//! daily statistics, and implements the repository traits from
//! `dockwatch-core` so the tracker and aggregator run directly against it.
//!
//! # Tables
//!
//! - `station_snapshots`: one row per station per poll, unique on
//!   `(station_id, timestamp)`
//! - `zero_bike_periods`: at most one open row per station
//! - `daily_stats`: one row per `(station_id, date)`
//! - `stations`: registry of names and capacities seen in the feed
//!
//! # Example
//!
//! ```no_run
//! use dockwatch_store::{SnapshotQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let query = SnapshotQuery::new().station("S1").limit(10);
//! let snapshots = store.query_snapshots(&query)?;
//! # Ok::<(), dockwatch_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{StoreCounts, StoredStation};
pub use queries::SnapshotQuery;
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/dockwatch/data.db`
/// - macOS: `~/Library/Application Support/dockwatch/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\dockwatch\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("dockwatch")
        .join("data.db")
}
