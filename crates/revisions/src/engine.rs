//! Revision queries for one audited entity type.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use audit_store::{AuditLogStore, AuditProperty, AuditQuery, AuditReader, AuditRow, SortDirection};
use common::RevisionNumber;
use serde_json::Value;

use crate::{
    AuditedEntity, EntityInformation, Page, PageRequest, Result, Revision, RevisionAssembler,
    RevisionError, RevisionMetadata, RevisionMetadataStrategy, Revisions,
};

/// Read-only revision history of an audited entity type.
#[async_trait]
pub trait RevisionRepository<T: AuditedEntity, N: RevisionNumber>: Send + Sync {
    /// The revision in which the entity was changed most recently.
    async fn find_last_change_revision(&self, id: &T::Id) -> Result<Option<Revision<N, T>>>;

    /// The entity as recorded at exactly the given revision.
    async fn find_revision(&self, id: &T::Id, revision_number: N)
    -> Result<Option<Revision<N, T>>>;

    /// All revisions of the entity, oldest first.
    async fn find_revisions(&self, id: &T::Id) -> Result<Revisions<N, T>>;

    /// One page of the entity's revisions, ordered by revision number.
    async fn find_revisions_page(
        &self,
        id: &T::Id,
        page: &PageRequest,
    ) -> Result<Page<Revision<N, T>>>;
}

/// Answers revision queries against an audit log.
///
/// Every operation opens its own read session and releases it before
/// returning, on success and on error alike.
pub struct RevisionQueryEngine<S, T, N> {
    store: S,
    entity: EntityInformation,
    assembler: RevisionAssembler,
    _types: PhantomData<fn() -> (T, N)>,
}

impl<S, T, N> RevisionQueryEngine<S, T, N>
where
    S: AuditLogStore,
    T: AuditedEntity,
    N: RevisionNumber,
{
    pub fn new(store: S, strategy: RevisionMetadataStrategy) -> Self {
        Self {
            store,
            entity: EntityInformation::of::<T>(),
            assembler: RevisionAssembler::new(strategy),
            _types: PhantomData,
        }
    }

    pub fn entity_information(&self) -> &EntityInformation {
        &self.entity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The most recent revision of the entity. Writers never let timestamps
    /// decrease, so this is also the highest-numbered revision.
    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_last_change_revision(&self, id: &T::Id) -> Result<Option<Revision<N, T>>> {
        let started = Instant::now();
        let query = self
            .entity_query(id)?
            .order_by(AuditProperty::RevisionTimestamp, SortDirection::Descending)
            .order_by(AuditProperty::RevisionNumber, SortDirection::Descending)
            .limit(1);

        let mut reader = self.store.begin_read().await?;
        let rows = reader.query(&query).await?;

        let revision = match rows.into_iter().next() {
            Some(row) => self.single_revision(row)?,
            None => None,
        };

        record("find_last_change_revision", started, revision.is_none());
        Ok(revision)
    }

    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_revision(
        &self,
        id: &T::Id,
        revision_number: N,
    ) -> Result<Option<Revision<N, T>>> {
        let started = Instant::now();
        let revision = to_stored_revision(revision_number)?;
        let query = self.entity_query(id)?.revision(revision);

        let mut reader = self.store.begin_read().await?;
        let mut rows = reader.query(&query).await?;

        let found = match rows.len() {
            0 => None,
            1 => match rows.pop() {
                Some(row) => self.single_revision(row)?,
                None => None,
            },
            actual => {
                return Err(RevisionError::IncorrectResultSize {
                    expected: 1,
                    actual,
                });
            }
        };

        record("find_revision", started, found.is_none());
        Ok(found)
    }

    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_revisions(&self, id: &T::Id) -> Result<Revisions<N, T>> {
        let started = Instant::now();
        let query = self.entity_query(id)?;

        let mut reader = self.store.begin_read().await?;
        let rows = reader.query(&query).await?;

        let revisions = Revisions::new(self.history_revisions(rows)?);

        tracing::debug!(count = revisions.len(), "revisions loaded");
        record("find_revisions", started, revisions.is_empty());
        Ok(revisions)
    }

    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_revisions_page(
        &self,
        id: &T::Id,
        page: &PageRequest,
    ) -> Result<Page<Revision<N, T>>> {
        let started = Instant::now();
        let direction = page.revision_direction()?;
        let offset = page.offset()?;
        let query = self.entity_query(id)?;

        let mut reader = self.store.begin_read().await?;
        let total = reader.count(&query).await?;

        if offset >= total {
            tracing::debug!(offset, total, "page starts past the last revision");
            record("find_revisions_page", started, true);
            return Ok(Page::empty(page.clone(), total));
        }

        let limit = u64::try_from(page.size()).map_err(|_| RevisionError::NumericOverflow {
            value: page.size().to_string(),
            target: "u64",
        })?;
        let rows = reader
            .query(
                &query
                    .order_by(AuditProperty::RevisionNumber, direction)
                    .offset(offset)
                    .limit(limit),
            )
            .await?;

        let content = self.history_revisions(rows)?;

        record("find_revisions_page", started, content.is_empty());
        Ok(Page::new(content, page.clone(), total))
    }

    /// Revision numbers in which the entity changed, ascending.
    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_revision_numbers(&self, id: &T::Id) -> Result<Vec<N>> {
        let started = Instant::now();
        let entity_id = self.entity.id_value(id)?;

        let mut reader = self.store.begin_read().await?;
        let numbers = reader
            .revision_numbers(self.entity.entity_name(), &entity_id)
            .await?
            .into_iter()
            .map(to_revision_number::<N>)
            .collect::<Result<Vec<_>>>()?;

        record("find_revision_numbers", started, numbers.is_empty());
        Ok(numbers)
    }

    /// The entity as it existed at the given revision, following earlier
    /// revisions if it did not change at that one.
    #[tracing::instrument(skip(self), fields(entity = self.entity.entity_name()))]
    pub async fn find_entity_at_revision(&self, id: &T::Id, revision_number: N) -> Result<Option<T>> {
        let started = Instant::now();
        let entity_id = self.entity.id_value(id)?;
        let revision = to_stored_revision(revision_number)?;

        let mut reader = self.store.begin_read().await?;
        let snapshot = reader
            .find_snapshot(self.entity.entity_name(), &entity_id, revision)
            .await?;

        let entity = snapshot.map(serde_json::from_value::<T>).transpose()?;
        record("find_entity_at_revision", started, entity.is_none());
        Ok(entity)
    }

    /// Metadata of one revision, independent of any entity.
    #[tracing::instrument(skip(self))]
    pub async fn find_revision_metadata(
        &self,
        revision_number: N,
    ) -> Result<Option<RevisionMetadata<N>>> {
        let started = Instant::now();
        let revision = to_stored_revision(revision_number)?;

        let mut reader = self.store.begin_read().await?;
        let metadata = match reader.find_revision_entity(revision).await? {
            Some(marker) => Some(self.assembler.strategy().extract(marker, None)?),
            None => None,
        };

        record("find_revision_metadata", started, metadata.is_none());
        Ok(metadata)
    }

    /// Metadata of several revisions. Unknown revisions are left out.
    ///
    /// An empty input returns an empty map without touching the store.
    #[tracing::instrument(skip(self, revision_numbers), fields(requested = revision_numbers.len()))]
    pub async fn find_revision_metadata_batch(
        &self,
        revision_numbers: &[N],
    ) -> Result<BTreeMap<N, RevisionMetadata<N>>> {
        if revision_numbers.is_empty() {
            tracing::debug!("no revisions requested");
            return Ok(BTreeMap::new());
        }

        let started = Instant::now();
        let revisions = revision_numbers
            .iter()
            .map(|number| to_stored_revision(*number))
            .collect::<Result<BTreeSet<i64>>>()?;

        let mut reader = self.store.begin_read().await?;
        let markers = reader.find_revision_entities(&revisions).await?;

        let metadata = markers
            .into_iter()
            .map(|(revision, marker)| {
                let number = to_revision_number::<N>(revision)?;
                let metadata = self.assembler.strategy().extract(marker, None)?;
                Ok((number, metadata))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        record("find_revision_metadata_batch", started, metadata.is_empty());
        Ok(metadata)
    }

    fn entity_query(&self, id: &T::Id) -> Result<AuditQuery> {
        let entity_id = self.entity.id_value(id)?;
        Ok(AuditQuery::for_entity(self.entity.entity_name()).entity_id(entity_id))
    }

    /// Assembles a row looked up on its own. A row without a snapshot is
    /// reported as absent.
    fn single_revision(&self, row: AuditRow) -> Result<Option<Revision<N, T>>> {
        let AuditRow {
            revision,
            revision_type,
            revision_entity,
            snapshot,
            ..
        } = row;

        let Some(snapshot) = snapshot else {
            tracing::warn!(revision, "revision row has no entity snapshot");
            return Ok(None);
        };

        let entity = decode::<T>(snapshot)?;
        self.assembler
            .assemble(entity, revision_entity, Some(revision_type))
            .map(Some)
    }

    /// Assembles the rows of a history listing. Every row must carry a
    /// snapshot and each revision may occur only once.
    fn history_revisions(&self, rows: Vec<AuditRow>) -> Result<Vec<Revision<N, T>>> {
        let mut seen = HashSet::with_capacity(rows.len());

        rows.into_iter()
            .map(|row| {
                if !seen.insert(row.revision) {
                    return Err(RevisionError::DuplicateRevision(row.revision));
                }
                let snapshot = row
                    .snapshot
                    .ok_or(RevisionError::MissingSnapshot(row.revision))?;
                self.assembler.assemble(
                    decode::<T>(snapshot)?,
                    row.revision_entity,
                    Some(row.revision_type),
                )
            })
            .collect()
    }
}

#[async_trait]
impl<S, T, N> RevisionRepository<T, N> for RevisionQueryEngine<S, T, N>
where
    S: AuditLogStore,
    T: AuditedEntity,
    N: RevisionNumber,
{
    async fn find_last_change_revision(&self, id: &T::Id) -> Result<Option<Revision<N, T>>> {
        RevisionQueryEngine::find_last_change_revision(self, id).await
    }

    async fn find_revision(
        &self,
        id: &T::Id,
        revision_number: N,
    ) -> Result<Option<Revision<N, T>>> {
        RevisionQueryEngine::find_revision(self, id, revision_number).await
    }

    async fn find_revisions(&self, id: &T::Id) -> Result<Revisions<N, T>> {
        RevisionQueryEngine::find_revisions(self, id).await
    }

    async fn find_revisions_page(
        &self,
        id: &T::Id,
        page: &PageRequest,
    ) -> Result<Page<Revision<N, T>>> {
        RevisionQueryEngine::find_revisions_page(self, id, page).await
    }
}

fn decode<T: AuditedEntity>(snapshot: Value) -> Result<T> {
    Ok(serde_json::from_value(snapshot)?)
}

fn to_stored_revision<N: RevisionNumber>(revision_number: N) -> Result<i64> {
    revision_number
        .to_i64()
        .ok_or_else(|| RevisionError::NumericOverflow {
            value: revision_number.to_string(),
            target: "i64",
        })
}

fn to_revision_number<N: RevisionNumber>(revision: i64) -> Result<N> {
    N::from_i64(revision).ok_or_else(|| RevisionError::NumericOverflow {
        value: revision.to_string(),
        target: N::KIND.as_str(),
    })
}

fn record(operation: &'static str, started: Instant, empty: bool) {
    metrics::counter!("revision_queries_total", "operation" => operation).increment(1);
    if empty {
        metrics::counter!("revision_queries_empty_total", "operation" => operation).increment(1);
    }
    metrics::histogram!("revision_query_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_store::{AuditLogWriter, AuditedChange, InMemoryAuditStore, NewRevision};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        #[serde(default)]
        text: Option<String>,
    }

    impl AuditedEntity for Note {
        type Id = i64;
        const ENTITY_NAME: &'static str = "Note";
    }

    fn engine(store: &InMemoryAuditStore) -> RevisionQueryEngine<InMemoryAuditStore, Note, i32> {
        RevisionQueryEngine::new(store.clone(), RevisionMetadataStrategy::BuiltIn)
    }

    async fn write(store: &InMemoryAuditStore, change: AuditedChange) -> i64 {
        store
            .commit(NewRevision::default_entity(), vec![change])
            .await
            .unwrap()
    }

    fn note(id: i64, text: &str) -> Note {
        Note {
            id,
            text: Some(text.to_string()),
        }
    }

    #[tokio::test]
    async fn unknown_entity_yields_empty_results() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);

        assert!(engine.find_last_change_revision(&1).await.unwrap().is_none());
        assert!(engine.find_revision(&1, 1).await.unwrap().is_none());
        assert!(engine.find_revisions(&1).await.unwrap().is_empty());

        let page = engine
            .find_revisions_page(&1, &PageRequest::of(0, 10).unwrap())
            .await
            .unwrap();
        assert!(!page.has_content());
        assert_eq!(page.total_elements(), 0);
    }

    #[test]
    fn history_rejects_repeated_revisions() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        let row = AuditRow {
            revision: 3,
            revision_type: audit_store::RevisionType::Modify,
            revision_timestamp: chrono::Utc::now(),
            revision_entity: audit_store::RevisionEntity::Default(
                audit_store::DefaultRevisionEntity::new(3, 0),
            ),
            snapshot: Some(json!({ "id": 1, "text": "a" })),
        };

        let result = engine.history_revisions(vec![row.clone(), row]);

        assert!(matches!(result, Err(RevisionError::DuplicateRevision(3))));
    }

    #[tokio::test]
    async fn deleted_revision_exposes_tombstone() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        write(&store, AuditedChange::added("Note", &1, &note(1, "a")).unwrap()).await;
        let deleted = write(&store, engine.entity_information().deletion(&1).unwrap()).await;

        let last = engine.find_last_change_revision(&1).await.unwrap().unwrap();
        assert_eq!(last.revision_number(), Some(deleted as i32));
        assert_eq!(last.revision_type(), Some(audit_store::RevisionType::Delete));
        assert_eq!(last.entity(), &Note { id: 1, text: None });

        assert!(
            engine
                .find_entity_at_revision(&1, deleted as i32)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn entity_at_revision_follows_earlier_changes() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        write(&store, AuditedChange::added("Note", &1, &note(1, "a")).unwrap()).await;
        let other = write(&store, AuditedChange::added("Note", &2, &note(2, "x")).unwrap()).await;

        let at_other = engine
            .find_entity_at_revision(&1, other as i32)
            .await
            .unwrap();
        assert_eq!(at_other, Some(note(1, "a")));
        assert_eq!(engine.find_revision_numbers(&1).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn metadata_lookups() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        let first = write(&store, AuditedChange::added("Note", &1, &note(1, "a")).unwrap()).await;
        let second = write(&store, AuditedChange::added("Note", &2, &note(2, "b")).unwrap()).await;

        let metadata = engine
            .find_revision_metadata(first as i32)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.revision_number(), Some(first as i32));
        assert!(engine.find_revision_metadata(99).await.unwrap().is_none());

        let batch = engine
            .find_revision_metadata_batch(&[first as i32, second as i32, 99])
            .await
            .unwrap();
        assert_eq!(
            batch.keys().copied().collect::<Vec<_>>(),
            vec![first as i32, second as i32]
        );

        assert!(
            engine
                .find_revision_metadata_batch(&[])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unsupported_sort_property_fails_before_querying() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        let request = PageRequest::of(0, 5)
            .unwrap()
            .with_sort(crate::SortOrder::desc("text"));

        let result = engine.find_revisions_page(&1, &request).await;

        assert!(matches!(result, Err(RevisionError::UnsupportedSort(_))));
    }

    #[tokio::test]
    async fn rows_without_snapshot_are_handled_per_operation() {
        let store = InMemoryAuditStore::new();
        let engine = engine(&store);
        store
            .commit(
                NewRevision::default_entity(),
                vec![AuditedChange {
                    entity_name: "Note".to_string(),
                    entity_id: json!(1),
                    revision_type: audit_store::RevisionType::Modify,
                    state: Value::Null,
                }],
            )
            .await
            .unwrap();

        assert!(engine.find_revision(&1, 1).await.unwrap().is_none());
        assert!(matches!(
            engine.find_revisions(&1).await,
            Err(RevisionError::MissingSnapshot(1))
        ));
    }

    /// A store whose connection is lost: sessions either fail to open or
    /// fail on every read.
    #[derive(Clone)]
    struct UnavailableStore {
        fail_on_open: bool,
    }

    struct UnavailableReader;

    fn pool_timed_out() -> audit_store::AuditStoreError {
        audit_store::AuditStoreError::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl AuditLogStore for UnavailableStore {
        type Reader = UnavailableReader;

        async fn begin_read(&self) -> audit_store::Result<UnavailableReader> {
            if self.fail_on_open {
                return Err(audit_store::AuditStoreError::Database(sqlx::Error::PoolClosed));
            }
            Ok(UnavailableReader)
        }
    }

    #[async_trait]
    impl AuditReader for UnavailableReader {
        async fn revision_numbers(
            &mut self,
            _entity_name: &str,
            _entity_id: &Value,
        ) -> audit_store::Result<Vec<i64>> {
            Err(pool_timed_out())
        }

        async fn find_snapshot(
            &mut self,
            _entity_name: &str,
            _entity_id: &Value,
            _revision: i64,
        ) -> audit_store::Result<Option<Value>> {
            Err(pool_timed_out())
        }

        async fn find_revision_entity(
            &mut self,
            _revision: i64,
        ) -> audit_store::Result<Option<audit_store::RevisionEntity>> {
            Err(pool_timed_out())
        }

        async fn find_revision_entities(
            &mut self,
            _revisions: &BTreeSet<i64>,
        ) -> audit_store::Result<BTreeMap<i64, audit_store::RevisionEntity>> {
            Err(pool_timed_out())
        }

        async fn query(&mut self, _query: &AuditQuery) -> audit_store::Result<Vec<AuditRow>> {
            Err(pool_timed_out())
        }

        async fn count(&mut self, _query: &AuditQuery) -> audit_store::Result<u64> {
            Err(pool_timed_out())
        }
    }

    fn is_store_error(result: Result<impl std::fmt::Debug>, expected: &str) -> bool {
        matches!(
            result,
            Err(RevisionError::Store(audit_store::AuditStoreError::Database(ref e)))
                if e.to_string() == expected
        )
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let timed_out = sqlx::Error::PoolTimedOut.to_string();
        let engine: RevisionQueryEngine<_, Note, i32> = RevisionQueryEngine::new(
            UnavailableStore {
                fail_on_open: false,
            },
            RevisionMetadataStrategy::BuiltIn,
        );
        let page = PageRequest::of(0, 5).unwrap();

        assert!(is_store_error(engine.find_last_change_revision(&1).await, &timed_out));
        assert!(is_store_error(engine.find_revision(&1, 1).await, &timed_out));
        assert!(is_store_error(engine.find_revisions(&1).await, &timed_out));
        assert!(is_store_error(engine.find_revisions_page(&1, &page).await, &timed_out));
        assert!(is_store_error(engine.find_revision_numbers(&1).await, &timed_out));
        assert!(is_store_error(engine.find_entity_at_revision(&1, 1).await, &timed_out));
        assert!(is_store_error(engine.find_revision_metadata(1).await, &timed_out));
        assert!(is_store_error(
            engine.find_revision_metadata_batch(&[1, 2]).await,
            &timed_out
        ));

        // An empty batch never reaches the store.
        assert!(
            engine
                .find_revision_metadata_batch(&[])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn failing_to_open_a_session_surfaces_as_store_error() {
        let engine: RevisionQueryEngine<_, Note, i32> = RevisionQueryEngine::new(
            UnavailableStore { fail_on_open: true },
            RevisionMetadataStrategy::BuiltIn,
        );

        assert!(is_store_error(
            engine.find_revisions(&1).await,
            &sqlx::Error::PoolClosed.to_string()
        ));
    }
}
