//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A station in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStation {
    /// Station identifier.
    pub station_id: String,
    /// Display name from the feed.
    pub name: Option<String>,
    /// Dock capacity from the feed.
    pub capacity: Option<u32>,
    /// First poll that included this station.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    /// Most recent poll that included this station.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl StoredStation {
    /// Name if known, otherwise the station id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.station_id)
    }
}

/// Row counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    /// Stations in the registry.
    pub stations: u64,
    /// Snapshot rows.
    pub snapshots: u64,
    /// Periods still open.
    pub open_periods: u64,
    /// Closed periods.
    pub closed_periods: u64,
    /// Daily stat rows.
    pub daily_stats: u64,
}
