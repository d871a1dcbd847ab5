//! Error types for dockwatch-core.
//!
//! # Error Taxonomy
//!
//! | Error | Kind | Handling |
//! |-------|------|----------|
//! | [`Error::Fetch`] | Transient (mostly) | Retried with backoff, cycle aborted on exhaustion |
//! | [`Error::OutOfOrderInput`] | Data integrity | Surfaced; the station is skipped for the cycle |
//! | [`Error::NoDataForDate`] | Expected | Reported as "no data", never fatal |
//! | [`Error::Storage`] | Fatal for the cycle | The cycle's transaction rolls back |
//! | [`Error::InvalidConfig`] | Fatal | Fix configuration and restart |
//!
//! Only [`FetchError`]s that describe network trouble are retried; a feed that
//! answers with malformed JSON will answer the same way on the next attempt.

use std::time::Duration;

use thiserror::Error;
use time::{Date, OffsetDateTime};

/// Errors raised while fetching or decoding the station feed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Transport-level HTTP failure.
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        /// The URL being fetched.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The URL being fetched.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Request exceeded the configured timeout.
    #[error("Request to {url} timed out after {duration:?}")]
    Timeout {
        /// The URL being fetched.
        url: String,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// Body was not valid JSON for the expected document.
    #[error("Failed to decode {url}: {source}")]
    Decode {
        /// The URL being fetched.
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON decoded but is missing required structure.
    #[error("Invalid feed response: {0}")]
    InvalidResponse(String),

    /// The feed listed no stations at all.
    #[error("Feed returned no stations")]
    EmptyFeed,
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout { .. } => true,
            FetchError::EmptyFeed => true,
            FetchError::Decode { .. } => false,
            FetchError::InvalidResponse(_) => false,
        }
    }
}

/// Errors produced by the tracker, aggregator and feed client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The feed could not be fetched or decoded.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A snapshot's timestamp is earlier than the station's last processed one.
    #[error(
        "Out-of-order snapshot for station {station_id}: {received} is earlier than last processed {last_processed}"
    )]
    OutOfOrderInput {
        /// Station the snapshot belongs to.
        station_id: String,
        /// Timestamp the tracker last accepted for this station.
        last_processed: OffsetDateTime,
        /// Timestamp of the rejected snapshot.
        received: OffsetDateTime,
    },

    /// No snapshots exist for the station on the requested date.
    #[error("No data for station {station_id} on {date}")]
    NoDataForDate {
        /// Station identifier.
        station_id: String,
        /// The requested local date.
        date: Date,
    },

    /// The persistence layer failed.
    #[error("Storage error during {operation}: {source}")]
    Storage {
        /// The persistence operation that failed.
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wrap a persistence-layer error with the operation it occurred in.
    pub fn storage(
        operation: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this is the expected "nothing recorded that day" outcome.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::NoDataForDate { .. })
    }
}

/// Result type alias using dockwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_error_display() {
        let err = Error::OutOfOrderInput {
            station_id: "S1".to_string(),
            last_processed: datetime!(2024-05-01 10:05 UTC),
            received: datetime!(2024-05-01 10:00 UTC),
        };
        let msg = err.to_string();
        assert!(msg.contains("S1"));
        assert!(msg.contains("earlier"));

        let err = Error::NoDataForDate {
            station_id: "S2".to_string(),
            date: date!(2024-05-01),
        };
        assert_eq!(err.to_string(), "No data for station S2 on 2024-05-01");
        assert!(err.is_no_data());

        let err = Error::storage(
            "append_snapshot",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(err.to_string().contains("append_snapshot"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_fetch_error_retryable() {
        assert!(FetchError::EmptyFeed.is_retryable());
        assert!(
            FetchError::Status {
                url: "u".to_string(),
                status: 503
            }
            .is_retryable()
        );
        assert!(
            FetchError::Status {
                url: "u".to_string(),
                status: 429
            }
            .is_retryable()
        );
        assert!(
            !FetchError::Status {
                url: "u".to_string(),
                status: 404
            }
            .is_retryable()
        );
        assert!(!FetchError::InvalidResponse("missing data".to_string()).is_retryable());
        assert!(
            FetchError::Timeout {
                url: "u".to_string(),
                duration: Duration::from_secs(10)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: Error = FetchError::EmptyFeed.into();
        assert!(matches!(err, Error::Fetch(FetchError::EmptyFeed)));
        assert_eq!(err.to_string(), "Feed returned no stations");
    }
}
