//! Error type shared by all storage implementations.

use thiserror::Error;

/// Failure of a store operation.
#[derive(Debug, Error)]
pub enum DbError {
    /// A record already exists under this key. For quote inserts this is
    /// the concurrency-control primitive, not an exceptional condition:
    /// whoever inserted first won, and the existing record is
    /// authoritative.
    #[error("a record already exists under this hash")]
    Conflict,

    /// No record exists under this key.
    #[error("no record found under this hash")]
    NotFound,

    /// The underlying SQLite layer failed.
    #[error("sqlite: {0}")]
    Storage(#[from] sqlx::Error),

    /// A persisted record no longer decodes into a valid domain value.
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Convenience alias used by the storage traits.
pub type DbResult<T> = Result<T, DbError>;
