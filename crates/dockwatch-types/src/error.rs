//! Error types for parsing dates and offsets in dockwatch-types.

use thiserror::Error;

/// Errors that can occur when parsing user- or config-supplied values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not a `YYYY-MM-DD` date.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Not a fixed UTC offset.
    #[error("Invalid UTC offset '{0}': expected +HH:MM, -HH:MM or Z")]
    InvalidOffset(String),
}

/// Result type alias using dockwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
