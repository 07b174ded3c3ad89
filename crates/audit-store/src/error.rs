use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when interacting with the audit-log store.
#[derive(Debug, Error)]
pub enum AuditStoreError {
    /// A revision marker was expected but is missing from the store.
    #[error("Revision not found: {0}")]
    RevisionNotFound(i64),

    /// A marker lookup was issued for an empty revision set.
    ///
    /// Several engines reject `IN ()` style queries, so callers must
    /// short-circuit before asking.
    #[error("Cannot look up revision markers for an empty revision set")]
    EmptyRevisionSet,

    /// A revision number does not fit the representation required by the marker.
    #[error("Revision number {value} does not fit into {target}")]
    RevisionNumberOverflow { value: i64, target: &'static str },

    /// A change set handed to the writer was rejected.
    #[error("Invalid change set: {0}")]
    InvalidChange(String),

    /// A revision was committed with a timestamp older than the latest revision's.
    #[error("Revision timestamp {timestamp} is older than the latest revision timestamp {latest}")]
    NonMonotonicTimestamp {
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    /// A query could not be executed as specified.
    #[error("Invalid audit query: {0}")]
    InvalidQuery(String),

    /// A stored row carries a revision type code this store does not know.
    #[error("Unknown revision type code: {0}")]
    UnknownRevisionType(i16),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for audit store operations.
pub type Result<T> = std::result::Result<T, AuditStoreError>;
