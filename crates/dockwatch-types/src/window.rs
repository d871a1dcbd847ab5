//! Calendar-day windows in the feed's reference timezone.
//!
//! All persisted timestamps are UTC. A [`DayWindow`] maps a local calendar
//! date onto the half-open UTC range `[start, end)` it covers, which is what
//! the aggregator clips snapshots and zero-bike periods against.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const OFFSET_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// The UTC range covered by one local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    date: Date,
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl DayWindow {
    /// Window for `date` in a zone with the given fixed offset.
    #[must_use]
    pub fn new(date: Date, offset: UtcOffset) -> Self {
        let start = date
            .midnight()
            .assume_offset(offset)
            .to_offset(UtcOffset::UTC);
        Self {
            date,
            start,
            end: start + Duration::DAY,
        }
    }

    /// Window for the local date that contains `instant`.
    #[must_use]
    pub fn containing(instant: OffsetDateTime, offset: UtcOffset) -> Self {
        Self::new(instant.to_offset(offset).date(), offset)
    }

    /// The local calendar date.
    #[must_use]
    pub fn date(&self) -> Date {
        self.date
    }

    /// Inclusive UTC start (local midnight).
    #[must_use]
    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Exclusive UTC end (next local midnight).
    #[must_use]
    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// Whether `instant` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Whether an interval starting at `from` and ending at `to` (`None` for
    /// still open) touches this window.
    ///
    /// A zero-length interval counts when it sits inside the window.
    #[must_use]
    pub fn overlaps(&self, from: OffsetDateTime, to: Option<OffsetDateTime>) -> bool {
        if from >= self.end {
            return false;
        }
        match to {
            None => true,
            Some(to) => to > self.start || from >= self.start,
        }
    }

    /// Whole seconds of `[from, to)` inside the window, never negative.
    #[must_use]
    pub fn overlap_seconds(&self, from: OffsetDateTime, to: OffsetDateTime) -> i64 {
        let start = from.max(self.start);
        let end = to.min(self.end);
        (end - start).whole_seconds().max(0)
    }

    /// Seconds of the window that have elapsed by `as_of`.
    ///
    /// A full day for past dates, partial for the in-progress date, zero for
    /// future dates.
    #[must_use]
    pub fn observed_seconds(&self, as_of: OffsetDateTime) -> i64 {
        self.overlap_seconds(self.start, as_of)
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> ParseResult<Date> {
    Date::parse(s.trim(), DATE_FORMAT).map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// Format a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Parse a fixed UTC offset such as `+01:00`, `-05:30` or `Z`.
pub fn parse_utc_offset(s: &str) -> ParseResult<UtcOffset> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(trimmed, OFFSET_FORMAT).map_err(|_| ParseError::InvalidOffset(s.to_string()))
}

/// Drop sub-second precision; persisted timestamps are whole seconds.
#[must_use]
pub fn truncate_to_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant - Duration::nanoseconds(i64::from(instant.nanosecond()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::{date, datetime, offset};

    #[test]
    fn test_utc_window_bounds() {
        let window = DayWindow::new(date!(2024-05-01), UtcOffset::UTC);
        assert_eq!(window.start(), datetime!(2024-05-01 00:00 UTC));
        assert_eq!(window.end(), datetime!(2024-05-02 00:00 UTC));
        assert!(window.contains(datetime!(2024-05-01 23:59:59 UTC)));
        assert!(!window.contains(datetime!(2024-05-02 00:00 UTC)));
    }

    #[test]
    fn test_offset_window_bounds() {
        let window = DayWindow::new(date!(2024-05-01), offset!(+1));
        assert_eq!(window.start(), datetime!(2024-04-30 23:00 UTC));
        assert_eq!(window.end(), datetime!(2024-05-01 23:00 UTC));
    }

    #[test]
    fn test_containing_uses_local_date() {
        let window = DayWindow::containing(datetime!(2024-05-01 23:30 UTC), offset!(+1));
        assert_eq!(window.date(), date!(2024-05-02));
    }

    #[test]
    fn test_overlap_seconds_clamps() {
        let window = DayWindow::new(date!(2024-05-02), UtcOffset::UTC);
        let secs = window.overlap_seconds(
            datetime!(2024-05-01 22:00 UTC),
            datetime!(2024-05-02 02:00 UTC),
        );
        assert_eq!(secs, 7200);

        let none = window.overlap_seconds(
            datetime!(2024-05-01 10:00 UTC),
            datetime!(2024-05-01 11:00 UTC),
        );
        assert_eq!(none, 0);
    }

    #[test]
    fn test_overlaps() {
        let window = DayWindow::new(date!(2024-05-02), UtcOffset::UTC);
        // ended exactly at midnight: belongs to the previous day only
        assert!(!window.overlaps(
            datetime!(2024-05-01 22:00 UTC),
            Some(datetime!(2024-05-02 00:00 UTC))
        ));
        assert!(window.overlaps(datetime!(2024-05-01 22:00 UTC), None));
        assert!(window.overlaps(
            datetime!(2024-05-02 10:00 UTC),
            Some(datetime!(2024-05-02 10:00 UTC))
        ));
        assert!(!window.overlaps(datetime!(2024-05-03 00:00 UTC), None));
    }

    #[test]
    fn test_observed_seconds() {
        let window = DayWindow::new(date!(2024-05-02), UtcOffset::UTC);
        assert_eq!(window.observed_seconds(datetime!(2024-05-02 06:00 UTC)), 6 * 3600);
        assert_eq!(window.observed_seconds(datetime!(2024-05-09 00:00 UTC)), 86_400);
        assert_eq!(window.observed_seconds(datetime!(2024-05-01 00:00 UTC)), 0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-05-01").unwrap(), date!(2024-05-01));
        assert!(matches!(parse_date("05/01/2024"), Err(ParseError::InvalidDate(_))));
        assert_eq!(format_date(date!(2024-05-01)), "2024-05-01");
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+01:00").unwrap(), offset!(+1));
        assert_eq!(parse_utc_offset("-05:30").unwrap(), offset!(-5:30));
        assert_eq!(parse_utc_offset("Z").unwrap(), UtcOffset::UTC);
        assert!(parse_utc_offset("Europe/London").is_err());
    }

    #[test]
    fn test_truncate_to_seconds() {
        let ts = datetime!(2024-05-01 10:00:05.750 UTC);
        assert_eq!(truncate_to_seconds(ts), datetime!(2024-05-01 10:00:05 UTC));
    }

    proptest! {
        #[test]
        fn prop_consecutive_windows_partition_any_range(
            start in 0i64..400 * 86_400,
            length in 0i64..5 * 86_400,
            offset_minutes in -12i32 * 60..=14 * 60,
        ) {
            let offset = UtcOffset::from_whole_seconds(offset_minutes * 60).unwrap();
            let base = datetime!(2024-01-01 00:00 UTC);
            let from = base + Duration::seconds(start);
            let to = from + Duration::seconds(length);

            let mut window = DayWindow::containing(from, offset);
            let mut covered = 0;
            while window.start() < to {
                covered += window.overlap_seconds(from, to);
                window = DayWindow::new(window.date().next_day().unwrap(), offset);
            }
            prop_assert_eq!(covered, length);
        }
    }
}
