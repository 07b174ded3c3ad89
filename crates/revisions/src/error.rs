//! Revision query error types.

use audit_store::AuditStoreError;
use thiserror::Error;

/// Errors that can occur while querying revision history.
///
/// Missing history is never an error: it is reported as `None`, an empty
/// [`Revisions`](crate::Revisions) or an empty [`Page`](crate::Page).
#[derive(Debug, Error)]
pub enum RevisionError {
    /// An argument was rejected before any query was issued.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A lookup that must match at most one row matched several.
    #[error("Incorrect result size: expected at most {expected}, found {actual}")]
    IncorrectResultSize { expected: usize, actual: usize },

    /// The audit log returned the same revision twice for one entity.
    #[error("Revision {0} appears more than once in the history of one entity")]
    DuplicateRevision(i64),

    /// A history row has no reconstructable snapshot.
    #[error("Revision {0} has no entity snapshot")]
    MissingSnapshot(i64),

    /// A numeric value does not fit the type it has to be converted to.
    #[error("Numeric value {value} does not fit into {target}")]
    NumericOverflow { value: String, target: &'static str },

    /// A page request asked for an ordering other than by revision number.
    #[error("Unsupported sort property '{0}', only 'revisionNumber' is supported")]
    UnsupportedSort(String),

    /// A revision marker could not be interpreted.
    #[error("Invalid revision marker: {0}")]
    InvalidRevisionMarker(String),

    /// Wiring or configuration is inconsistent.
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// An error occurred in the audit-log store.
    #[error("Audit store error: {0}")]
    Store(#[from] AuditStoreError),

    /// A snapshot could not be deserialized into the entity type.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for revision operations.
pub type Result<T> = std::result::Result<T, RevisionError>;
