use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    AuditProperty, AuditQuery, AuditStoreError, AuditedChange, CustomRevisionEntity,
    DefaultRevisionEntity, NewRevision, Result, RevisionEntity, RevisionType,
    change::validate_changes,
    store::{AuditLogStore, AuditLogWriter, AuditReader, AuditRow},
};

const ROW_COLUMNS: &str = "a.rev, a.revtype, a.state, r.revtstmp, r.entity_name AS rev_entity_name, r.fields AS rev_fields";

/// PostgreSQL-backed audit log.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Creates a new PostgreSQL audit store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url` and wraps it in a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn marker_from_columns(
        revision: i64,
        timestamp: i64,
        entity_name: Option<String>,
        fields: Option<Value>,
    ) -> Result<RevisionEntity> {
        match entity_name {
            None => {
                let id = i32::try_from(revision).map_err(|_| {
                    AuditStoreError::RevisionNumberOverflow {
                        value: revision,
                        target: "i32",
                    }
                })?;
                Ok(RevisionEntity::Default(DefaultRevisionEntity::new(
                    id, timestamp,
                )))
            }
            Some(name) => {
                let fields = match fields {
                    Some(Value::Object(map)) => map,
                    Some(Value::Null) | None => serde_json::Map::new(),
                    Some(other) => serde_json::from_value(other)?,
                };
                Ok(RevisionEntity::Custom(CustomRevisionEntity::from_fields(
                    name, fields,
                )))
            }
        }
    }

    fn row_to_audit_row(row: PgRow) -> Result<AuditRow> {
        let revision: i64 = row.try_get("rev")?;
        let timestamp: i64 = row.try_get("revtstmp")?;
        let revision_timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp).ok_or_else(
            || AuditStoreError::InvalidQuery(format!("revision {revision} has an invalid timestamp")),
        )?;

        Ok(AuditRow {
            revision,
            revision_type: RevisionType::from_code(row.try_get("revtype")?)?,
            revision_timestamp,
            revision_entity: Self::marker_from_columns(
                revision,
                timestamp,
                row.try_get("rev_entity_name")?,
                row.try_get("rev_fields")?,
            )?,
            snapshot: row
                .try_get::<Option<Value>, _>("state")?
                .filter(|state| !state.is_null()),
        })
    }
}

fn bound(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| AuditStoreError::InvalidQuery(format!("{what} {value} exceeds i64::MAX")))
}

/// Appends the WHERE clause for a query's predicate, returning the parameter count.
fn push_predicate(sql: &mut String, query: &AuditQuery) -> usize {
    let mut param_count = 1;
    sql.push_str(" WHERE a.entity_name = $1");
    if query.entity_id.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND a.entity_id = ${param_count}"));
    }
    if query.revision.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND a.rev = ${param_count}"));
    }
    param_count
}

/// Read session backed by a read-only, repeatable-read transaction.
///
/// The transaction is rolled back when the reader is dropped.
pub struct PostgresAuditReader {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AuditLogStore for PostgresAuditStore {
    type Reader = PostgresAuditReader;

    async fn begin_read(&self) -> Result<PostgresAuditReader> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresAuditReader { tx })
    }
}

#[async_trait]
impl AuditReader for PostgresAuditReader {
    async fn revision_numbers(
        &mut self,
        entity_name: &str,
        entity_id: &Value,
    ) -> Result<Vec<i64>> {
        let revisions: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT rev FROM audit_log
            WHERE entity_name = $1 AND entity_id = $2
            ORDER BY rev ASC
            "#,
        )
        .bind(entity_name)
        .bind(entity_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(revisions)
    }

    async fn find_snapshot(
        &mut self,
        entity_name: &str,
        entity_id: &Value,
        revision: i64,
    ) -> Result<Option<Value>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT revtype, state FROM audit_log
            WHERE entity_name = $1 AND entity_id = $2 AND rev <= $3
            ORDER BY rev DESC
            LIMIT 1
            "#,
        )
        .bind(entity_name)
        .bind(entity_id)
        .bind(revision)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let revision_type = RevisionType::from_code(row.try_get("revtype")?)?;
                if revision_type == RevisionType::Delete {
                    Ok(None)
                } else {
                    Ok(row
                        .try_get::<Option<Value>, _>("state")?
                        .filter(|state| !state.is_null()))
                }
            }
            None => Ok(None),
        }
    }

    async fn find_revision_entity(&mut self, revision: i64) -> Result<Option<RevisionEntity>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT rev, revtstmp, entity_name, fields FROM revinfo WHERE rev = $1")
                .bind(revision)
                .fetch_optional(&mut *self.tx)
                .await?;

        match row {
            Some(row) => Ok(Some(PostgresAuditStore::marker_from_columns(
                row.try_get("rev")?,
                row.try_get("revtstmp")?,
                row.try_get("entity_name")?,
                row.try_get("fields")?,
            )?)),
            None => Ok(None),
        }
    }

    async fn find_revision_entities(
        &mut self,
        revisions: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, RevisionEntity>> {
        if revisions.is_empty() {
            return Err(AuditStoreError::EmptyRevisionSet);
        }

        let numbers: Vec<i64> = revisions.iter().copied().collect();
        let rows = sqlx::query(
            "SELECT rev, revtstmp, entity_name, fields FROM revinfo WHERE rev = ANY($1)",
        )
        .bind(numbers)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(i64, RevisionEntity)> {
                let revision: i64 = row.try_get("rev")?;
                let marker = PostgresAuditStore::marker_from_columns(
                    revision,
                    row.try_get("revtstmp")?,
                    row.try_get("entity_name")?,
                    row.try_get("fields")?,
                )?;
                Ok((revision, marker))
            })
            .collect()
    }

    async fn query(&mut self, query: &AuditQuery) -> Result<Vec<AuditRow>> {
        let mut sql = format!(
            "SELECT {ROW_COLUMNS} FROM audit_log a JOIN revinfo r ON r.rev = a.rev"
        );
        let mut param_count = push_predicate(&mut sql, query);

        // Without explicit terms rows come back in commit order.
        if query.orders.is_empty() {
            sql.push_str(" ORDER BY a.rev ASC");
        } else {
            let terms: Vec<String> = query
                .orders
                .iter()
                .map(|order| {
                    let column = match order.property {
                        AuditProperty::RevisionNumber => "a.rev",
                        AuditProperty::RevisionTimestamp => "r.revtstmp",
                    };
                    format!("{column} {}", order.direction.as_sql())
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(&query.entity_name);

        if let Some(ref id) = query.entity_id {
            sqlx_query = sqlx_query.bind(id);
        }
        if let Some(revision) = query.revision {
            sqlx_query = sqlx_query.bind(revision);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(bound(limit, "limit")?);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(bound(offset, "offset")?);
        }

        let rows = sqlx_query.fetch_all(&mut *self.tx).await?;
        rows.into_iter()
            .map(PostgresAuditStore::row_to_audit_row)
            .collect()
    }

    async fn count(&mut self, query: &AuditQuery) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM audit_log a");
        push_predicate(&mut sql, query);

        let mut sqlx_query = sqlx::query_scalar::<Postgres, i64>(&sql).bind(&query.entity_name);
        if let Some(ref id) = query.entity_id {
            sqlx_query = sqlx_query.bind(id);
        }
        if let Some(revision) = query.revision {
            sqlx_query = sqlx_query.bind(revision);
        }

        let count = sqlx_query.fetch_one(&mut *self.tx).await?;
        u64::try_from(count)
            .map_err(|_| AuditStoreError::InvalidQuery(format!("negative row count {count}")))
    }
}

#[async_trait]
impl AuditLogWriter for PostgresAuditStore {
    async fn commit(&self, revision: NewRevision, changes: Vec<AuditedChange>) -> Result<i64> {
        validate_changes(&changes)?;

        let mut tx = self.pool.begin().await?;

        // Serializes writers so the timestamp check and the insert see the same latest revision.
        sqlx::query("LOCK TABLE revinfo IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let timestamp = revision.timestamp_or(Utc::now());
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(revtstmp) FROM revinfo")
            .fetch_one(&mut *tx)
            .await?;
        if let Some(latest) = latest
            && timestamp.timestamp_millis() < latest
        {
            let latest = DateTime::<Utc>::from_timestamp_millis(latest).ok_or_else(|| {
                AuditStoreError::InvalidQuery(format!("latest revision has an invalid timestamp {latest}"))
            })?;
            return Err(AuditStoreError::NonMonotonicTimestamp { timestamp, latest });
        }

        let number: i64 = sqlx::query_scalar("SELECT nextval('revinfo_rev_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let marker = revision.build(number, timestamp)?;

        let (entity_name, fields) = match &marker {
            RevisionEntity::Default(_) => (None, None),
            RevisionEntity::Custom(custom) => (
                Some(custom.entity_name().to_string()),
                Some(Value::Object(custom.fields().clone())),
            ),
        };

        sqlx::query(
            r#"
            INSERT INTO revinfo (rev, revtstmp, entity_name, fields)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(number)
        .bind(timestamp.timestamp_millis())
        .bind(entity_name)
        .bind(fields)
        .execute(&mut *tx)
        .await?;

        for change in &changes {
            sqlx::query(
                r#"
                INSERT INTO audit_log (entity_name, entity_id, rev, revtype, state)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&change.entity_name)
            .bind(&change.entity_id)
            .bind(number)
            .bind(change.revision_type.code())
            .bind(&change.state)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(revision = number, changes = changes.len(), "revision recorded");

        Ok(number)
    }
}
