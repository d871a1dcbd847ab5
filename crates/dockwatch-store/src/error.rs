//! Error types for dockwatch-store.

use std::path::PathBuf;

/// Result type for dockwatch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dockwatch-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was written by a schema version this build cannot read.
    #[error("Unsupported schema version {found} (this build supports {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Closing a period that does not exist or is already closed.
    #[error("No open zero-bike period with id {0}")]
    PeriodNotOpen(i64),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for dockwatch_core::Error {
    fn from(err: Error) -> Self {
        dockwatch_core::Error::storage("store", err)
    }
}
