//! Audited entity metadata.

use std::fmt::Debug;

use audit_store::AuditedChange;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Result, RevisionError};

/// An entity type whose changes are recorded in the audit log.
///
/// Snapshots are stored as JSON, so the entity deserializes from its stored
/// form. Tombstones only carry the identifier under [`ID_FIELD`], so fields
/// other than the identifier should be optional or defaulted.
///
/// [`ID_FIELD`]: AuditedEntity::ID_FIELD
pub trait AuditedEntity: DeserializeOwned + Send + Sync + 'static {
    /// Identifier type of the entity.
    type Id: Serialize + Debug + Send + Sync;

    /// Name under which the audit log records this entity type.
    const ENTITY_NAME: &'static str;

    /// Serialized name of the identifier property.
    const ID_FIELD: &'static str = "id";
}

/// Entity type information resolved once per repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInformation {
    entity_name: &'static str,
    id_field: &'static str,
    id_type: &'static str,
}

impl EntityInformation {
    /// Resolves the information for an audited entity type.
    pub fn of<T: AuditedEntity>() -> Self {
        Self {
            entity_name: T::ENTITY_NAME,
            id_field: T::ID_FIELD,
            id_type: std::any::type_name::<T::Id>(),
        }
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn id_field(&self) -> &'static str {
        self.id_field
    }

    /// Rust type name of the identifier.
    pub fn id_type(&self) -> &'static str {
        self.id_type
    }

    /// Serializes an identifier into the form the audit log stores.
    ///
    /// Identifiers that serialize to `null` are rejected.
    pub fn id_value<I: Serialize + ?Sized>(&self, id: &I) -> Result<Value> {
        let value = serde_json::to_value(id)?;
        if value.is_null() {
            return Err(RevisionError::InvalidArgument(format!(
                "{} identifier must not be null",
                self.entity_name
            )));
        }
        Ok(value)
    }

    /// Builds the audited change that records the deletion of `id`.
    ///
    /// The tombstone is keyed by the entity's identifier property, so it
    /// deserializes back into the entity type.
    pub fn deletion<I: Serialize + ?Sized>(&self, id: &I) -> Result<AuditedChange> {
        let entity_id = self.id_value(id)?;
        Ok(AuditedChange::deleted(
            self.entity_name,
            self.id_field,
            &entity_id,
        )?)
    }
}
