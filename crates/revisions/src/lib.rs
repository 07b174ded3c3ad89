//! Revision history for audited entities.
//!
//! Answers three questions about an entity tracked by an audit log:
//! - which revision changed it last ([`RevisionQueryEngine::find_last_change_revision`])
//! - what all its revisions are ([`RevisionQueryEngine::find_revisions`])
//! - what one sorted, bounded page of those revisions is
//!   ([`RevisionQueryEngine::find_revisions_page`])
//!
//! Engines are created per entity type by a [`RevisionRepositoryFactory`].

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod factory;
pub mod metadata;
pub mod page;
pub mod revision;
pub mod telemetry;

pub use common::{EntityId, RevisionNumber, RevisionNumberKind};
pub use config::RevisionConfig;
pub use engine::{RevisionQueryEngine, RevisionRepository};
pub use entity::{AuditedEntity, EntityInformation};
pub use error::{Result, RevisionError};
pub use factory::RevisionRepositoryFactory;
pub use metadata::{
    CustomRevisionEntityInformation, RevisionEntityInformation, RevisionMetadata,
    RevisionMetadataStrategy,
};
pub use page::{Page, PageRequest, REVISION_NUMBER_PROPERTY, SortOrder};
pub use revision::{Revision, RevisionAssembler, Revisions};
pub use telemetry::{LogFormat, TelemetryConfig};
