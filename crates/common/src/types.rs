use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an audited entity instance, as recorded in the audit log.
///
/// The audit log keys every row by entity name and serialized identifier,
/// and treats a null identifier as "no entity". The nil UUID is the UUID
/// form of that null, so it is never a valid `EntityId`: parsing,
/// conversion and deserialization all reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Uuid", into = "Uuid")]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a value cannot identify an audited entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidEntityIdError {
    /// The text is not a UUID.
    Malformed(String),
    /// The nil UUID, which the audit log reads as a null identifier.
    Nil,
}

impl Display for InvalidEntityIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "'{value}' is not a valid entity id"),
            Self::Nil => write!(f, "the nil UUID cannot identify an audited entity"),
        }
    }
}

impl std::error::Error for InvalidEntityIdError {}

impl TryFrom<Uuid> for EntityId {
    type Error = InvalidEntityIdError;

    fn try_from(uuid: Uuid) -> Result<Self, Self::Error> {
        if uuid.is_nil() {
            return Err(InvalidEntityIdError::Nil);
        }
        Ok(Self(uuid))
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::parse_str(s.trim()).map_err(|_| InvalidEntityIdError::Malformed(s.to_string()))?;
        Self::try_from(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}
