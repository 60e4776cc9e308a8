//! Error types for the fieldsync engine.

use std::time::Duration;
use thiserror::Error;

/// All possible errors from the fieldsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Remote errors
    #[error("remote unreachable: {0}")]
    Connectivity(String),

    #[error("remote rejected batch: {0}")]
    RemoteRejection(String),

    #[error("remote commit timed out after {0:?}")]
    Timeout(Duration),

    // Local store errors
    #[error("local store failure: {0}")]
    LocalStore(String),

    // Import errors
    #[error("failed to parse import file: {0}")]
    ImportParse(String),

    #[error("unsupported import format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    // Record errors
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error only means the remote could not be reached.
    ///
    /// Connectivity failures defer a sync; they are not reported as errors.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::LocalStore(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::LocalStore(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
