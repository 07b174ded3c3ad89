//! Sample audited entities shared by the integration tests.

#![allow(dead_code)]

use audit_store::{AuditLogWriter, AuditedChange, NewRevision};
use common::EntityId;
use revisions::{AuditedEntity, EntityInformation};
use serde::{Deserialize, Serialize};

/// A software license. Only `id` survives a deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
}

impl AuditedEntity for License {
    type Id = EntityId;
    const ENTITY_NAME: &'static str = "License";
}

impl License {
    pub fn new(id: EntityId, name: &str) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl AuditedEntity for Country {
    type Id = i64;
    const ENTITY_NAME: &'static str = "Country";
}

/// A catalog item identified by its stock keeping unit rather than an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub sku: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl AuditedEntity for Sku {
    type Id = i64;
    const ENTITY_NAME: &'static str = "Sku";
    const ID_FIELD: &'static str = "sku";
}

impl Country {
    pub fn new(id: i64, code: &str, name: &str) -> Self {
        Self {
            id,
            code: Some(code.to_string()),
            name: Some(name.to_string()),
        }
    }
}

pub async fn add<W: AuditLogWriter>(store: &W, license: &License) -> i64 {
    store
        .commit(
            NewRevision::default_entity(),
            vec![AuditedChange::added(License::ENTITY_NAME, &license.id, license).unwrap()],
        )
        .await
        .unwrap()
}

pub async fn modify<W: AuditLogWriter>(store: &W, license: &License) -> i64 {
    store
        .commit(
            NewRevision::default_entity(),
            vec![AuditedChange::modified(License::ENTITY_NAME, &license.id, license).unwrap()],
        )
        .await
        .unwrap()
}

pub async fn delete<W: AuditLogWriter>(store: &W, id: &EntityId) -> i64 {
    store
        .commit(
            NewRevision::default_entity(),
            vec![EntityInformation::of::<License>().deletion(id).unwrap()],
        )
        .await
        .unwrap()
}
