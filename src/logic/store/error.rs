use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Sample rejected: value outside [0, 100], unrepresentable timestamp, bad table name
    #[error("validation error: {0}")]
    Validation(String),

    /// Sample older than the newest stored one
    #[error("ordering error: sample at {got} is older than last stored sample at {last}")]
    Ordering {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    /// Ground-truth series is damaged
    #[error("store corrupted: {0}")]
    Corrupted(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// Store file or its directory is not reachable
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Only corruption ends the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupted(_))
    }

    /// The sample was bad; the store is fine
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Validation(_) | StoreError::Ordering { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
                StoreError::Corrupted(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
