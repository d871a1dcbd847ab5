//! Zero-bike interval tracking.
//!
//! [`ZeroBikeTracker`] consumes successive snapshots per station and keeps the
//! `zero_bike_periods` table in step with what was observed:
//!
//! | Bikes | Open period | Action |
//! |-------|-------------|--------|
//! | zero | none | open a period starting at the snapshot |
//! | zero | yes | nothing, the period continues |
//! | nonzero | yes | close it at the snapshot |
//! | nonzero | none | nothing |
//!
//! Per-station state is rebuilt from the store with [`ZeroBikeTracker::seed`],
//! so a restarted collector continues an interval that was open when it
//! stopped. A station that disappears from the feed keeps its period open
//! until a later nonzero observation; there is no timeout.

use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::debug;

use dockwatch_types::{StationSnapshot, ZeroBikePeriod};

use crate::error::{Error, Result};
use crate::traits::{PeriodStore, SnapshotLog};

/// The open period the tracker knows about for a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPeriod {
    /// Store-assigned period id.
    pub id: i64,
    /// Start of the period.
    pub start: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StationState {
    last_timestamp: Option<OffsetDateTime>,
    open_period: Option<OpenPeriod>,
}

/// What processing a snapshot did to the station's intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A new period was opened.
    Opened(ZeroBikePeriod),
    /// The station is still at zero; the open period continues.
    Continued,
    /// The open period was closed.
    Closed(ZeroBikePeriod),
    /// The station has bikes and no period is open.
    Idle,
}

/// Per-station state machine over zero-bike intervals.
///
/// The tracker is cheap to clone; the collector processes a cycle on a clone
/// and swaps it in once the cycle's writes have committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZeroBikeTracker {
    stations: HashMap<String, StationState>,
    zero_threshold: u32,
}

impl ZeroBikeTracker {
    /// Create an empty tracker.
    ///
    /// A station counts as "at zero" when `bikes_available <= zero_threshold`.
    pub fn new(zero_threshold: u32) -> Self {
        Self {
            stations: HashMap::new(),
            zero_threshold,
        }
    }

    /// Rebuild tracker state from persisted snapshots and open periods.
    pub fn seed<S>(store: &S, zero_threshold: u32) -> Result<Self>
    where
        S: SnapshotLog + PeriodStore + ?Sized,
    {
        let mut tracker = Self::new(zero_threshold);

        for snapshot in store.latest_snapshots()? {
            tracker
                .stations
                .entry(snapshot.station_id)
                .or_default()
                .last_timestamp = Some(snapshot.timestamp);
        }

        for period in store.open_periods()? {
            let state = tracker.stations.entry(period.station_id).or_default();
            state.open_period = Some(OpenPeriod {
                id: period.id,
                start: period.start_timestamp,
            });
            // A period is only ever opened by a snapshot, but keep the order
            // check meaningful even if that snapshot is gone.
            if state.last_timestamp.is_none_or(|ts| ts < period.start_timestamp) {
                state.last_timestamp = Some(period.start_timestamp);
            }
        }

        debug!(
            "Seeded tracker with {} stations, {} open periods",
            tracker.stations.len(),
            tracker.open_count()
        );
        Ok(tracker)
    }

    /// The threshold at or below which a station counts as empty.
    pub fn zero_threshold(&self) -> u32 {
        self.zero_threshold
    }

    /// Number of stations the tracker has state for.
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Number of stations with an open period.
    pub fn open_count(&self) -> usize {
        self.stations
            .values()
            .filter(|s| s.open_period.is_some())
            .count()
    }

    /// The open period for a station, if any.
    pub fn open_period(&self, station_id: &str) -> Option<OpenPeriod> {
        self.stations.get(station_id).and_then(|s| s.open_period)
    }

    /// Timestamp of the last snapshot processed for a station.
    pub fn last_timestamp(&self, station_id: &str) -> Option<OffsetDateTime> {
        self.stations.get(station_id).and_then(|s| s.last_timestamp)
    }

    /// Feed the next snapshot for a station.
    ///
    /// Fails with [`Error::OutOfOrderInput`] if the snapshot is older than the
    /// last one processed for the station. On any error, tracker state is left
    /// unchanged.
    pub fn process<P>(&mut self, periods: &P, snapshot: &StationSnapshot) -> Result<Transition>
    where
        P: PeriodStore + ?Sized,
    {
        let station_id = snapshot.station_id.as_str();
        let timestamp = snapshot.timestamp;
        let current = self.stations.get(station_id).cloned().unwrap_or_default();

        if let Some(last) = current.last_timestamp
            && timestamp < last
        {
            return Err(Error::OutOfOrderInput {
                station_id: station_id.to_string(),
                last_processed: last,
                received: timestamp,
            });
        }

        let at_zero = snapshot.bikes_available <= self.zero_threshold;
        let (open_period, transition) = match (at_zero, current.open_period) {
            (true, None) => {
                let period = periods.open_period(station_id, timestamp)?;
                debug!(station_id, %timestamp, period_id = period.id, "zero-bike period opened");
                let open = OpenPeriod {
                    id: period.id,
                    start: period.start_timestamp,
                };
                (Some(open), Transition::Opened(period))
            }
            (true, Some(open)) => (Some(open), Transition::Continued),
            (false, Some(open)) => {
                let period = ZeroBikePeriod::open(open.id, station_id, open.start).closed_at(timestamp);
                let duration = period.duration_seconds.unwrap_or_default();
                periods.close_period(open.id, timestamp, duration)?;
                debug!(
                    station_id,
                    %timestamp,
                    period_id = open.id,
                    duration_seconds = duration,
                    "zero-bike period closed"
                );
                (None, Transition::Closed(period))
            }
            (false, None) => (None, Transition::Idle),
        };

        self.stations.insert(
            station_id.to_string(),
            StationState {
                last_timestamp: Some(timestamp),
                open_period,
            },
        );
        Ok(transition)
    }
}
