use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{AuditQuery, AuditedChange, NewRevision, Result, RevisionEntity, RevisionType};

/// One revision row joined with its revision marker.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    /// The revision number of this row.
    pub revision: i64,

    /// What kind of change the row records.
    pub revision_type: RevisionType,

    /// Commit time of the revision.
    pub revision_timestamp: DateTime<Utc>,

    /// The raw revision marker.
    pub revision_entity: RevisionEntity,

    /// The entity state at this revision. None when the stored state is null.
    pub snapshot: Option<Value>,
}

/// A read session over the audit log.
///
/// All reads issued through one reader observe the same snapshot of the
/// log. The session is released when the reader is dropped.
#[async_trait]
pub trait AuditReader: Send {
    /// Lists the revision numbers in which the entity changed, ascending.
    async fn revision_numbers(&mut self, entity_name: &str, entity_id: &Value)
    -> Result<Vec<i64>>;

    /// Reconstructs the entity as of the given revision.
    ///
    /// Returns None if the entity did not exist at that revision or had
    /// been deleted by then.
    async fn find_snapshot(
        &mut self,
        entity_name: &str,
        entity_id: &Value,
        revision: i64,
    ) -> Result<Option<Value>>;

    /// Finds the revision marker for a revision number.
    async fn find_revision_entity(&mut self, revision: i64) -> Result<Option<RevisionEntity>>;

    /// Finds the revision markers for a set of revision numbers.
    ///
    /// Missing revisions are absent from the returned map.
    async fn find_revision_entities(
        &mut self,
        revisions: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, RevisionEntity>>;

    /// Runs a query over revision rows.
    async fn query(&mut self, query: &AuditQuery) -> Result<Vec<AuditRow>>;

    /// Counts the revision rows matching the query's predicate.
    ///
    /// Ordering and bounds on the query are ignored.
    async fn count(&mut self, query: &AuditQuery) -> Result<u64>;
}

/// Source of read sessions over an audit log.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    type Reader: AuditReader;

    /// Opens a read-only session.
    async fn begin_read(&self) -> Result<Self::Reader>;
}

/// Write side of an audit log, used by whatever tracks entity changes.
#[async_trait]
pub trait AuditLogWriter: Send + Sync {
    /// Records one revision containing the given changes.
    ///
    /// Changes are recorded atomically. Returns the assigned revision number,
    /// which is strictly greater than every previously assigned one.
    ///
    /// Revision timestamps never decrease with the revision number: a
    /// revision stamped earlier than the latest one fails with
    /// [`NonMonotonicTimestamp`](crate::AuditStoreError::NonMonotonicTimestamp).
    async fn commit(&self, revision: NewRevision, changes: Vec<AuditedChange>) -> Result<i64>;
}
