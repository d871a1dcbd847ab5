//! Data model for bikeshare station availability history.
//!
//! This crate provides the types shared by the feed client, the tracker and
//! aggregator in `dockwatch-core`, and the SQLite store in `dockwatch-store`.
//!
//! # Types
//!
//! - [`StationStatus`]: one station record as returned by a feed poll
//! - [`StationSnapshot`]: the immutable row persisted for each poll
//! - [`ZeroBikePeriod`]: an interval during which a station had no bikes
//! - [`DailyStat`]: per-station, per-day aggregate
//! - [`DayWindow`]: the UTC range covered by a local calendar date
//!
//! # Example
//!
//! ```
//! use dockwatch_types::{DayWindow, StationSnapshot};
//! use time::macros::{date, datetime};
//! use time::UtcOffset;
//!
//! let window = DayWindow::new(date!(2024-05-01), UtcOffset::UTC);
//! let snapshot = StationSnapshot::new("S1", datetime!(2024-05-01 10:00 UTC), 5);
//! assert!(window.contains(snapshot.timestamp));
//! ```

pub mod error;
pub mod types;
pub mod window;

pub use error::{ParseError, ParseResult};
pub use types::{DailyStat, StationSnapshot, StationStatus, ZeroBikePeriod};
pub use window::{DayWindow, format_date, parse_date, parse_utc_offset, truncate_to_seconds};
