pub mod change;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod revision_entity;
pub mod store;

pub use change::AuditedChange;
pub use error::{AuditStoreError, Result};
pub use memory::{InMemoryAuditReader, InMemoryAuditStore};
pub use postgres::{PostgresAuditReader, PostgresAuditStore};
pub use query::{AuditOrder, AuditProperty, AuditQuery, SortDirection};
pub use revision_entity::{
    CustomRevisionEntity, DefaultRevisionEntity, NewRevision, RevisionEntity, RevisionType,
};
pub use store::{AuditLogStore, AuditLogWriter, AuditReader, AuditRow};
