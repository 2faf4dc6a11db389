use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The persistence queue rejected or lost the work item.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// A stored value could not be interpreted.
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

/// Failures of the persistence queue itself, as opposed to failures of the
/// work it runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// `cancel()` was called, or the worker is gone.
    #[error("persistence queue is closed")]
    Closed,

    /// The work item panicked. The queue keeps running.
    #[error("work item panicked")]
    Panicked,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
