//! Common error types for the warehouse loader

use sqlx::error::DatabaseError;
use thiserror::Error;

/// Primary SQLite result codes meaning the database file is gone or unusable
const STORAGE_FAILURE_CODES: [i32; 5] = [
    10, // SQLITE_IOERR
    11, // SQLITE_CORRUPT
    13, // SQLITE_FULL
    14, // SQLITE_CANTOPEN
    26, // SQLITE_NOTADB
];

/// Common result type for loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by extraction, staging, merge and orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error outside of record parsing
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A raw record batch could not be parsed or lacks a required field.
    /// The batch is skipped and the run continues.
    #[error("Malformed input in {batch}: {reason}")]
    MalformedInput { batch: String, reason: String },

    /// Fact rows without a dimension match, rejected under strict policy
    #[error("{count} unresolved {table} row(s) rejected")]
    UnresolvedReference { table: String, count: u64 },

    /// Constraint violation while merging staged rows into a permanent table.
    /// The table's merge is rolled back.
    #[error("Merge into {table} violated a constraint: {message}")]
    MergeConflict { table: String, message: String },

    /// The storage collaborator cannot be reached; fatal for the run
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A fact-table step was attempted before its dimensions were merged
    #[error("Phase order violated: {0}")]
    PhaseOrder(String),

    /// Invalid caller input (bad table name, bad arena id, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `MalformedInput` error for the named source
    pub fn malformed(batch: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            batch: batch.into(),
            reason: reason.into(),
        }
    }

    /// Classify a storage error raised while merging into `table`
    pub fn from_merge(table: &str, err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Database(ref db_err) => match db_err.kind() {
                ErrorKind::NotNullViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::CheckViolation => Error::MergeConflict {
                    table: table.to_string(),
                    message: db_err.message().to_string(),
                },
                _ => Error::from_storage(err),
            },
            other => Error::from_storage(other),
        }
    }

    /// Map connectivity and database-file failures to `StorageUnavailable`,
    /// keep the rest as `Database`
    pub fn from_storage(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::StorageUnavailable(err.to_string()),
            sqlx::Error::Database(ref db_err) if is_storage_failure(&**db_err) => {
                Error::StorageUnavailable(err.to_string())
            }
            other => Error::Database(other),
        }
    }

    /// Whether this error must abort the whole run rather than one batch
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

/// SQLite reports extended codes; the low byte is the primary code
fn is_storage_failure(db_err: &dyn DatabaseError) -> bool {
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map_or(false, |code| STORAGE_FAILURE_CODES.contains(&(code & 0xff)))
}
