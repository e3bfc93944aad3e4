//! Store error types.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Error type for queue store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Unique key already present
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A previous holder of the connection lock panicked
    #[error("Connection lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// IO error while preparing database files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The blocking task running the operation panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// True when the write lost a race against another writer and can simply be retried.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Maps a unique-constraint failure to [`StoreError::DuplicateKey`].
    pub(crate) fn from_insert(err: rusqlite::Error, key: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateKey(key.into())
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
