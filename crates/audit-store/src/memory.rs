use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use crate::{
    AuditOrder, AuditProperty, AuditQuery, AuditStoreError, AuditedChange, NewRevision, Result,
    RevisionEntity, RevisionType,
    change::validate_changes,
    store::{AuditLogStore, AuditLogWriter, AuditReader, AuditRow},
};

#[derive(Debug, Clone)]
struct StoredRevision {
    timestamp: DateTime<Utc>,
    entity: RevisionEntity,
}

#[derive(Debug, Clone)]
struct StoredRow {
    entity_name: String,
    entity_id: Value,
    revision: i64,
    revision_type: RevisionType,
    state: Value,
}

#[derive(Debug, Default)]
struct AuditLogState {
    revisions: BTreeMap<i64, StoredRevision>,
    rows: Vec<StoredRow>,
}

impl AuditLogState {
    fn rows_for<'a>(
        &'a self,
        entity_name: &'a str,
        entity_id: &'a Value,
    ) -> impl Iterator<Item = &'a StoredRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.entity_name == entity_name && &row.entity_id == entity_id)
    }

    fn matches(query: &AuditQuery, row: &StoredRow) -> bool {
        if row.entity_name != query.entity_name {
            return false;
        }
        if let Some(ref id) = query.entity_id
            && &row.entity_id != id
        {
            return false;
        }
        if let Some(revision) = query.revision
            && row.revision != revision
        {
            return false;
        }
        true
    }

    fn join(&self, row: &StoredRow) -> Result<AuditRow> {
        let stored = self
            .revisions
            .get(&row.revision)
            .ok_or(AuditStoreError::RevisionNotFound(row.revision))?;

        Ok(AuditRow {
            revision: row.revision,
            revision_type: row.revision_type,
            revision_timestamp: stored.timestamp,
            revision_entity: stored.entity.clone(),
            snapshot: (!row.state.is_null()).then(|| row.state.clone()),
        })
    }
}

fn compare_rows(orders: &[AuditOrder], a: &AuditRow, b: &AuditRow) -> Ordering {
    orders.iter().fold(Ordering::Equal, |acc, order| {
        acc.then_with(|| {
            let ordering = match order.property {
                AuditProperty::RevisionNumber => a.revision.cmp(&b.revision),
                AuditProperty::RevisionTimestamp => {
                    a.revision_timestamp.cmp(&b.revision_timestamp)
                }
            };
            if order.direction.is_descending() {
                ordering.reverse()
            } else {
                ordering
            }
        })
    })
}

/// In-memory audit log for testing.
///
/// Provides the same interface as the PostgreSQL implementation. Like some
/// SQL engines it refuses marker lookups for an empty revision set.
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    state: Arc<RwLock<AuditLogState>>,
}

impl InMemoryAuditStore {
    /// Creates a new empty in-memory audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of recorded revisions.
    pub async fn revision_count(&self) -> usize {
        self.state.read().await.revisions.len()
    }

    /// Returns the number of recorded revision rows.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Clears all revisions and rows.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.revisions.clear();
        state.rows.clear();
    }
}

/// Read session over an [`InMemoryAuditStore`].
///
/// Holds a read lock for its whole lifetime, so commits wait until the
/// reader is dropped.
pub struct InMemoryAuditReader {
    state: OwnedRwLockReadGuard<AuditLogState>,
}

#[async_trait]
impl AuditLogStore for InMemoryAuditStore {
    type Reader = InMemoryAuditReader;

    async fn begin_read(&self) -> Result<InMemoryAuditReader> {
        Ok(InMemoryAuditReader {
            state: self.state.clone().read_owned().await,
        })
    }
}

#[async_trait]
impl AuditReader for InMemoryAuditReader {
    async fn revision_numbers(
        &mut self,
        entity_name: &str,
        entity_id: &Value,
    ) -> Result<Vec<i64>> {
        let mut revisions: Vec<i64> = self
            .state
            .rows_for(entity_name, entity_id)
            .map(|row| row.revision)
            .collect();
        revisions.sort_unstable();
        Ok(revisions)
    }

    async fn find_snapshot(
        &mut self,
        entity_name: &str,
        entity_id: &Value,
        revision: i64,
    ) -> Result<Option<Value>> {
        let latest = self
            .state
            .rows_for(entity_name, entity_id)
            .filter(|row| row.revision <= revision)
            .max_by_key(|row| row.revision);

        Ok(match latest {
            Some(row) if row.revision_type != RevisionType::Delete && !row.state.is_null() => {
                Some(row.state.clone())
            }
            _ => None,
        })
    }

    async fn find_revision_entity(&mut self, revision: i64) -> Result<Option<RevisionEntity>> {
        Ok(self
            .state
            .revisions
            .get(&revision)
            .map(|stored| stored.entity.clone()))
    }

    async fn find_revision_entities(
        &mut self,
        revisions: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, RevisionEntity>> {
        if revisions.is_empty() {
            return Err(AuditStoreError::EmptyRevisionSet);
        }

        Ok(revisions
            .iter()
            .filter_map(|revision| {
                self.state
                    .revisions
                    .get(revision)
                    .map(|stored| (*revision, stored.entity.clone()))
            })
            .collect())
    }

    async fn query(&mut self, query: &AuditQuery) -> Result<Vec<AuditRow>> {
        let mut rows = self
            .state
            .rows
            .iter()
            .filter(|row| AuditLogState::matches(query, row))
            .map(|row| self.state.join(row))
            .collect::<Result<Vec<_>>>()?;

        // Stable sort keeps commit order for rows that compare equal.
        rows.sort_by(|a, b| compare_rows(&query.orders, a, b));

        let offset = query
            .offset
            .map_or(0, |offset| usize::try_from(offset).unwrap_or(usize::MAX));
        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&mut self, query: &AuditQuery) -> Result<u64> {
        let count = self
            .state
            .rows
            .iter()
            .filter(|row| AuditLogState::matches(query, row))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl AuditLogWriter for InMemoryAuditStore {
    async fn commit(&self, revision: NewRevision, changes: Vec<AuditedChange>) -> Result<i64> {
        validate_changes(&changes)?;

        let mut state = self.state.write().await;

        let number = state
            .revisions
            .keys()
            .next_back()
            .map_or(1, |last| last + 1);
        let timestamp = revision.timestamp_or(Utc::now());
        if let Some(latest) = state.revisions.values().next_back()
            && timestamp < latest.timestamp
        {
            return Err(AuditStoreError::NonMonotonicTimestamp {
                timestamp,
                latest: latest.timestamp,
            });
        }
        let entity = revision.build(number, timestamp)?;

        state
            .revisions
            .insert(number, StoredRevision { timestamp, entity });

        let change_count = changes.len();
        state.rows.extend(changes.into_iter().map(|change| StoredRow {
            entity_name: change.entity_name,
            entity_id: change.entity_id,
            revision: number,
            revision_type: change.revision_type,
            state: change.state,
        }));

        tracing::debug!(revision = number, changes = change_count, "revision recorded");

        Ok(number)
    }
}
