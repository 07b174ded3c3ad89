use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AuditStoreError, Result};

/// Name reported for the built-in revision marker.
pub const DEFAULT_REVISION_ENTITY_NAME: &str = "DefaultRevisionEntity";

/// The kind of change a revision row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionType {
    /// The entity was created in this revision.
    Add,
    /// The entity was modified in this revision.
    Modify,
    /// The entity was deleted in this revision; the row holds a tombstone.
    Delete,
}

impl RevisionType {
    /// Returns the persisted code for this revision type.
    pub fn code(&self) -> i16 {
        match self {
            Self::Add => 0,
            Self::Modify => 1,
            Self::Delete => 2,
        }
    }

    /// Parses a persisted revision type code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(Self::Add),
            1 => Ok(Self::Modify),
            2 => Ok(Self::Delete),
            other => Err(AuditStoreError::UnknownRevisionType(other)),
        }
    }
}

impl std::fmt::Display for RevisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Add => "ADD",
            Self::Modify => "MOD",
            Self::Delete => "DEL",
        };
        f.write_str(label)
    }
}

/// The built-in revision marker: an `i32` id and an epoch-millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRevisionEntity {
    id: i32,
    timestamp: i64,
}

impl DefaultRevisionEntity {
    pub fn new(id: i32, timestamp: i64) -> Self {
        Self { id, timestamp }
    }

    /// Revision number of this marker.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Commit time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Commit time as an instant, if the stored value is representable.
    pub fn revision_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A user-defined revision marker.
///
/// The revision number and timestamp live in named fields; which ones is
/// decided by configuration on the reading side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRevisionEntity {
    entity_name: String,
    fields: Map<String, Value>,
}

impl CustomRevisionEntity {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            fields: Map::new(),
        }
    }

    /// Creates a marker from an already populated field map.
    pub fn from_fields(entity_name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            entity_name: entity_name.into(),
            fields,
        }
    }

    /// Adds or replaces a field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// A raw revision marker as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RevisionEntity {
    Default(DefaultRevisionEntity),
    Custom(CustomRevisionEntity),
}

impl RevisionEntity {
    /// Name of the marker type.
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Default(_) => DEFAULT_REVISION_ENTITY_NAME,
            Self::Custom(custom) => custom.entity_name(),
        }
    }
}

impl From<DefaultRevisionEntity> for RevisionEntity {
    fn from(entity: DefaultRevisionEntity) -> Self {
        Self::Default(entity)
    }
}

impl From<CustomRevisionEntity> for RevisionEntity {
    fn from(entity: CustomRevisionEntity) -> Self {
        Self::Custom(entity)
    }
}

#[derive(Debug, Clone)]
enum NewRevisionKind {
    Default,
    Custom {
        entity_name: String,
        number_field: String,
        timestamp_field: String,
        fields: Map<String, Value>,
    },
}

/// Describes the marker a writer should create for the next revision.
///
/// The store assigns the revision number; the timestamp defaults to the
/// commit time unless pinned with [`NewRevision::at`].
#[derive(Debug, Clone)]
pub struct NewRevision {
    kind: NewRevisionKind,
    timestamp: Option<DateTime<Utc>>,
}

impl NewRevision {
    /// A revision recorded with the built-in marker.
    pub fn default_entity() -> Self {
        Self {
            kind: NewRevisionKind::Default,
            timestamp: None,
        }
    }

    /// A revision recorded with a custom marker.
    ///
    /// The assigned revision number is written to `number_field` and the
    /// commit time (epoch milliseconds) to `timestamp_field`.
    pub fn custom(
        entity_name: impl Into<String>,
        number_field: impl Into<String>,
        timestamp_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: NewRevisionKind::Custom {
                entity_name: entity_name.into(),
                number_field: number_field.into(),
                timestamp_field: timestamp_field.into(),
                fields: Map::new(),
            },
            timestamp: None,
        }
    }

    /// Adds an extra field to a custom marker. Ignored for the built-in marker.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        if let NewRevisionKind::Custom { ref mut fields, .. } = self.kind {
            fields.insert(name.into(), value);
        }
        self
    }

    /// Pins the revision timestamp instead of using the commit time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the revision timestamp, falling back to `now`.
    pub fn timestamp_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp.unwrap_or(now)
    }

    /// Builds the marker for the assigned revision number.
    pub fn build(&self, revision: i64, timestamp: DateTime<Utc>) -> Result<RevisionEntity> {
        let millis = timestamp.timestamp_millis();
        match &self.kind {
            NewRevisionKind::Default => {
                let id = i32::try_from(revision).map_err(|_| {
                    AuditStoreError::RevisionNumberOverflow {
                        value: revision,
                        target: "i32",
                    }
                })?;
                Ok(RevisionEntity::Default(DefaultRevisionEntity::new(id, millis)))
            }
            NewRevisionKind::Custom {
                entity_name,
                number_field,
                timestamp_field,
                fields,
            } => {
                let mut fields = fields.clone();
                fields.insert(number_field.clone(), Value::from(revision));
                fields.insert(timestamp_field.clone(), Value::from(millis));
                Ok(RevisionEntity::Custom(CustomRevisionEntity::from_fields(
                    entity_name.clone(),
                    fields,
                )))
            }
        }
    }
}

impl Default for NewRevision {
    fn default() -> Self {
        Self::default_entity()
    }
}
