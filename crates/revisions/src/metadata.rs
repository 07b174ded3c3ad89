//! Revision metadata and the strategies that extract it from raw markers.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use audit_store::{
    CustomRevisionEntity, DefaultRevisionEntity, NewRevision, RevisionEntity, RevisionType,
    revision_entity::DEFAULT_REVISION_ENTITY_NAME,
};
use chrono::{DateTime, Local, Utc};
use common::{RevisionNumber, RevisionNumberKind};
use serde_json::Value;

use crate::{Result, RevisionError};

/// Normalized description of one revision.
///
/// Equality, hashing and ordering only look at the revision number and
/// instant. The raw marker is kept for callers that need custom fields.
#[derive(Debug, Clone)]
pub struct RevisionMetadata<N> {
    revision_number: Option<N>,
    revision_instant: Option<DateTime<Utc>>,
    revision_type: Option<RevisionType>,
    delegate: RevisionEntity,
}

impl<N: RevisionNumber> RevisionMetadata<N> {
    pub fn new(
        revision_number: Option<N>,
        revision_instant: Option<DateTime<Utc>>,
        delegate: RevisionEntity,
    ) -> Self {
        Self {
            revision_number,
            revision_instant,
            revision_type: None,
            delegate,
        }
    }

    /// Attaches the kind of change recorded at this revision.
    pub fn with_revision_type(mut self, revision_type: RevisionType) -> Self {
        self.revision_type = Some(revision_type);
        self
    }

    pub fn revision_number(&self) -> Option<N> {
        self.revision_number
    }

    /// Returns the revision number or fails if the marker carried none.
    pub fn required_revision_number(&self) -> Result<N> {
        self.revision_number.ok_or_else(|| {
            RevisionError::InvalidRevisionMarker(format!(
                "{} carries no revision number",
                self.delegate.entity_name()
            ))
        })
    }

    pub fn revision_instant(&self) -> Option<DateTime<Utc>> {
        self.revision_instant
    }

    /// The revision instant in the local time zone.
    pub fn revision_date(&self) -> Option<DateTime<Local>> {
        self.revision_instant.map(|instant| instant.with_timezone(&Local))
    }

    pub fn revision_type(&self) -> Option<RevisionType> {
        self.revision_type
    }

    /// The raw revision marker.
    pub fn delegate(&self) -> &RevisionEntity {
        &self.delegate
    }

    fn key(&self) -> (Option<N>, Option<DateTime<Utc>>) {
        (self.revision_number, self.revision_instant)
    }
}

impl<N: RevisionNumber> PartialEq for RevisionMetadata<N> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<N: RevisionNumber> Eq for RevisionMetadata<N> {}

impl<N: RevisionNumber> Hash for RevisionMetadata<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<N: RevisionNumber> PartialOrd for RevisionMetadata<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<N: RevisionNumber> Ord for RevisionMetadata<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Field names of a user-defined revision marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRevisionEntityInformation {
    entity_name: String,
    number_field: String,
    timestamp_field: String,
    number_kind: RevisionNumberKind,
}

impl CustomRevisionEntityInformation {
    pub fn new(
        entity_name: impl Into<String>,
        number_field: impl Into<String>,
        timestamp_field: impl Into<String>,
        number_kind: RevisionNumberKind,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            number_field: number_field.into(),
            timestamp_field: timestamp_field.into(),
            number_kind,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn number_field(&self) -> &str {
        &self.number_field
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    pub fn number_kind(&self) -> RevisionNumberKind {
        self.number_kind
    }
}

/// Which revision marker the audit log is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RevisionEntityInformation {
    /// The built-in marker: an `i32` number and an epoch-millis timestamp.
    #[default]
    Default,
    /// A user-defined marker with designated number and timestamp fields.
    Custom(CustomRevisionEntityInformation),
}

impl RevisionEntityInformation {
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Default => DEFAULT_REVISION_ENTITY_NAME,
            Self::Custom(custom) => custom.entity_name(),
        }
    }

    /// Numeric type of the revision number.
    pub fn revision_number_kind(&self) -> RevisionNumberKind {
        match self {
            Self::Default => RevisionNumberKind::I32,
            Self::Custom(custom) => custom.number_kind(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Resolves the metadata extraction strategy for this marker.
    pub fn metadata_strategy(&self) -> RevisionMetadataStrategy {
        match self {
            Self::Default => RevisionMetadataStrategy::BuiltIn,
            Self::Custom(custom) => RevisionMetadataStrategy::CustomAnnotated {
                entity_name: custom.entity_name.clone(),
                number_field: custom.number_field.clone(),
                timestamp_field: custom.timestamp_field.clone(),
            },
        }
    }

    /// Starts a revision marker of the configured shape for a writer.
    pub fn new_revision(&self) -> NewRevision {
        match self {
            Self::Default => NewRevision::default_entity(),
            Self::Custom(custom) => NewRevision::custom(
                &custom.entity_name,
                &custom.number_field,
                &custom.timestamp_field,
            ),
        }
    }
}

/// Turns raw revision markers into [`RevisionMetadata`].
///
/// Resolved once per repository. Built-in markers always take the built-in
/// path regardless of the configured strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionMetadataStrategy {
    BuiltIn,
    CustomAnnotated {
        entity_name: String,
        number_field: String,
        timestamp_field: String,
    },
}

impl RevisionMetadataStrategy {
    pub fn extract<N: RevisionNumber>(
        &self,
        marker: RevisionEntity,
        revision_type: Option<RevisionType>,
    ) -> Result<RevisionMetadata<N>> {
        let metadata = match (&marker, self) {
            (RevisionEntity::Default(default), _) => {
                let (number, instant) = built_in_values::<N>(default)?;
                RevisionMetadata::new(Some(number), instant, marker)
            }
            (RevisionEntity::Custom(custom), Self::BuiltIn) => {
                return Err(RevisionError::Misconfiguration(format!(
                    "found revision marker {} but the repository is configured for {}",
                    custom.entity_name(),
                    DEFAULT_REVISION_ENTITY_NAME
                )));
            }
            (
                RevisionEntity::Custom(custom),
                Self::CustomAnnotated {
                    entity_name,
                    number_field,
                    timestamp_field,
                },
            ) => {
                if custom.entity_name() != entity_name {
                    return Err(RevisionError::Misconfiguration(format!(
                        "found revision marker {} but the repository is configured for {}",
                        custom.entity_name(),
                        entity_name
                    )));
                }
                let number = custom_number::<N>(custom, number_field)?;
                let instant = custom_instant(custom, timestamp_field)?;
                RevisionMetadata::new(number, instant, marker)
            }
        };

        Ok(match revision_type {
            Some(revision_type) => metadata.with_revision_type(revision_type),
            None => metadata,
        })
    }
}

fn overflow<N: RevisionNumber>(value: impl ToString) -> RevisionError {
    RevisionError::NumericOverflow {
        value: value.to_string(),
        target: N::KIND.as_str(),
    }
}

fn built_in_values<N: RevisionNumber>(
    marker: &DefaultRevisionEntity,
) -> Result<(N, Option<DateTime<Utc>>)> {
    let number = N::from_i64(i64::from(marker.id())).ok_or_else(|| overflow::<N>(marker.id()))?;
    Ok((number, marker.revision_date()))
}

fn custom_number<N: RevisionNumber>(
    marker: &CustomRevisionEntity,
    field: &str,
) -> Result<Option<N>> {
    let raw = match marker.field(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| overflow::<N>(number))?,
        Some(Value::String(text)) => text.trim().parse::<i64>().map_err(|_| {
            RevisionError::InvalidRevisionMarker(format!(
                "field '{field}' of {} is not a number: {text}",
                marker.entity_name()
            ))
        })?,
        Some(other) => {
            return Err(RevisionError::InvalidRevisionMarker(format!(
                "field '{field}' of {} is not a number: {other}",
                marker.entity_name()
            )));
        }
    };

    N::from_i64(raw).map(Some).ok_or_else(|| overflow::<N>(raw))
}

fn custom_instant(marker: &CustomRevisionEntity, field: &str) -> Result<Option<DateTime<Utc>>> {
    let invalid = |value: &Value| {
        RevisionError::InvalidRevisionMarker(format!(
            "field '{field}' of {} is not a timestamp: {value}",
            marker.entity_name()
        ))
    };

    let Some(value) = marker.field(field) else {
        return Ok(None);
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| invalid(value)),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|_| invalid(value)),
        other => Err(invalid(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn custom_strategy() -> RevisionMetadataStrategy {
        RevisionEntityInformation::Custom(CustomRevisionEntityInformation::new(
            "CustomRevision",
            "rev",
            "stamp",
            RevisionNumberKind::I64,
        ))
        .metadata_strategy()
    }

    #[test]
    fn built_in_marker_yields_number_and_instant() {
        let marker = RevisionEntity::Default(DefaultRevisionEntity::new(7, 1_700_000_000_000));

        let metadata: RevisionMetadata<i32> = RevisionMetadataStrategy::BuiltIn
            .extract(marker, Some(RevisionType::Add))
            .unwrap();

        assert_eq!(metadata.revision_number(), Some(7));
        assert_eq!(
            metadata.revision_instant().map(|i| i.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(metadata.revision_type(), Some(RevisionType::Add));
        assert!(metadata.revision_date().is_some());
    }

    #[test]
    fn built_in_marker_wins_over_custom_strategy() {
        let marker = RevisionEntity::Default(DefaultRevisionEntity::new(3, 0));

        let metadata: RevisionMetadata<i64> = custom_strategy().extract(marker, None).unwrap();

        assert_eq!(metadata.revision_number(), Some(3));
        assert_eq!(metadata.revision_type(), None);
    }

    #[test]
    fn custom_marker_under_built_in_strategy_is_misconfiguration() {
        let marker = RevisionEntity::Custom(
            CustomRevisionEntity::new("CustomRevision").with_field("rev", json!(1)),
        );

        let result: Result<RevisionMetadata<i64>> =
            RevisionMetadataStrategy::BuiltIn.extract(marker, None);

        assert!(matches!(result, Err(RevisionError::Misconfiguration(_))));
    }

    #[test]
    fn custom_marker_fields_are_read() {
        let marker = RevisionEntity::Custom(
            CustomRevisionEntity::new("CustomRevision")
                .with_field("rev", json!(42))
                .with_field("stamp", json!("2024-03-01T12:00:00Z"))
                .with_field("username", json!("alice")),
        );

        let metadata: RevisionMetadata<i64> = custom_strategy().extract(marker, None).unwrap();

        assert_eq!(metadata.revision_number(), Some(42));
        assert_eq!(
            metadata.revision_instant().map(|i| i.to_rfc3339()),
            Some("2024-03-01T12:00:00+00:00".to_string())
        );
        let RevisionEntity::Custom(custom) = metadata.delegate() else {
            panic!("expected custom marker");
        };
        assert_eq!(custom.field("username"), Some(&json!("alice")));
    }

    #[test]
    fn null_custom_fields_are_absent() {
        let marker = RevisionEntity::Custom(
            CustomRevisionEntity::new("CustomRevision").with_field("rev", Value::Null),
        );

        let metadata: RevisionMetadata<i64> = custom_strategy().extract(marker, None).unwrap();

        assert_eq!(metadata.revision_number(), None);
        assert_eq!(metadata.revision_instant(), None);
        assert!(matches!(
            metadata.required_revision_number(),
            Err(RevisionError::InvalidRevisionMarker(_))
        ));
    }

    #[test]
    fn narrowing_overflow_is_reported() {
        let marker = RevisionEntity::Custom(
            CustomRevisionEntity::new("CustomRevision").with_field("rev", json!(i64::MAX)),
        );

        let result: Result<RevisionMetadata<i32>> = custom_strategy().extract(marker, None);

        assert!(matches!(
            result,
            Err(RevisionError::NumericOverflow { target: "i32", .. })
        ));
    }

    #[test]
    fn foreign_custom_marker_is_misconfiguration() {
        let marker = RevisionEntity::Custom(
            CustomRevisionEntity::new("OtherRevision").with_field("rev", json!(1)),
        );

        let result: Result<RevisionMetadata<i64>> = custom_strategy().extract(marker, None);

        assert!(matches!(result, Err(RevisionError::Misconfiguration(_))));
    }

    #[test]
    fn equality_ignores_marker_and_kind() {
        let a: RevisionMetadata<i64> = RevisionMetadata::new(
            Some(1),
            None,
            RevisionEntity::Default(DefaultRevisionEntity::new(1, 0)),
        )
        .with_revision_type(RevisionType::Add);
        let b: RevisionMetadata<i64> = RevisionMetadata::new(
            Some(1),
            None,
            RevisionEntity::Custom(CustomRevisionEntity::new("CustomRevision")),
        );
        let c: RevisionMetadata<i64> = RevisionMetadata::new(
            Some(2),
            None,
            RevisionEntity::Default(DefaultRevisionEntity::new(2, 0)),
        );

        assert_eq!(a, b);
        assert!(a < c);
        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn information_reports_kind_and_new_revision_shape() {
        assert_eq!(
            RevisionEntityInformation::Default.revision_number_kind(),
            RevisionNumberKind::I32
        );
        assert_eq!(
            RevisionEntityInformation::Default.entity_name(),
            DEFAULT_REVISION_ENTITY_NAME
        );

        let custom = RevisionEntityInformation::Custom(CustomRevisionEntityInformation::new(
            "CustomRevision",
            "rev",
            "stamp",
            RevisionNumberKind::U64,
        ));
        assert_eq!(custom.revision_number_kind(), RevisionNumberKind::U64);

        let marker = custom
            .new_revision()
            .build(9, DateTime::<Utc>::from_timestamp_millis(1_000).unwrap())
            .unwrap();
        let RevisionEntity::Custom(marker) = marker else {
            panic!("expected custom marker");
        };
        assert_eq!(marker.field("rev"), Some(&json!(9)));
        assert_eq!(marker.field("stamp"), Some(&json!(1_000)));
    }
}
