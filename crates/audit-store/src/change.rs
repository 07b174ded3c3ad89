use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::{AuditStoreError, Result, RevisionType};

/// One audited change to be recorded in a revision.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditedChange {
    /// The audited entity type (e.g., "License", "Country").
    pub entity_name: String,

    /// The serialized identifier of the changed entity.
    pub entity_id: Value,

    /// What kind of change this is.
    pub revision_type: RevisionType,

    /// The entity state after the change, or a tombstone for deletions.
    pub state: Value,
}

impl AuditedChange {
    /// Records the creation of an entity.
    pub fn added<I: Serialize, T: Serialize>(
        entity_name: impl Into<String>,
        id: &I,
        state: &T,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self {
            entity_name: entity_name.into(),
            entity_id: serde_json::to_value(id)?,
            revision_type: RevisionType::Add,
            state: serde_json::to_value(state)?,
        })
    }

    /// Records a modification of an entity.
    pub fn modified<I: Serialize, T: Serialize>(
        entity_name: impl Into<String>,
        id: &I,
        state: &T,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self {
            entity_name: entity_name.into(),
            entity_id: serde_json::to_value(id)?,
            revision_type: RevisionType::Modify,
            state: serde_json::to_value(state)?,
        })
    }

    /// Records a deletion.
    ///
    /// The stored tombstone carries only the identifier, under `id_field`,
    /// so an entity type whose identifier property is not `id` still reads
    /// its tombstone back with the identifier set.
    pub fn deleted<I: Serialize>(
        entity_name: impl Into<String>,
        id_field: &str,
        id: &I,
    ) -> std::result::Result<Self, serde_json::Error> {
        let entity_id = serde_json::to_value(id)?;
        let mut tombstone = serde_json::Map::new();
        tombstone.insert(id_field.to_string(), entity_id.clone());
        Ok(Self {
            entity_name: entity_name.into(),
            entity_id,
            revision_type: RevisionType::Delete,
            state: Value::Object(tombstone),
        })
    }
}

/// Validates a change set before it is recorded as one revision.
pub fn validate_changes(changes: &[AuditedChange]) -> Result<()> {
    if changes.is_empty() {
        return Err(AuditStoreError::InvalidChange(
            "Cannot record a revision without changes".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for change in changes {
        if change.entity_id.is_null() {
            return Err(AuditStoreError::InvalidChange(format!(
                "{} change has a null identifier",
                change.entity_name
            )));
        }
        // One row per (entity, id) per revision.
        let key = (change.entity_name.as_str(), change.entity_id.to_string());
        if !seen.insert(key) {
            return Err(AuditStoreError::InvalidChange(format!(
                "{} {} changed more than once in the same revision",
                change.entity_name, change.entity_id
            )));
        }
    }

    Ok(())
}
