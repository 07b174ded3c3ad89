use serde_json::Value;

/// A revision-row property an audit query can order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditProperty {
    /// The revision number assigned by the store.
    RevisionNumber,
    /// The commit time recorded on the revision marker.
    RevisionTimestamp,
}

/// Direction of an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, Self::Descending)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One ordering term of an audit query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditOrder {
    pub property: AuditProperty,
    pub direction: SortDirection,
}

/// Query over the revision rows of one audited entity type.
///
/// Every builder method consumes the query and returns a new one, so a
/// query value is never shared between executions.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditQuery {
    /// The audited entity type.
    pub entity_name: String,

    /// Filter by serialized entity identifier.
    pub entity_id: Option<Value>,

    /// Filter by revision number.
    pub revision: Option<i64>,

    /// Ordering terms, applied in sequence.
    pub orders: Vec<AuditOrder>,

    /// Number of rows to skip.
    pub offset: Option<u64>,

    /// Maximum number of rows to return.
    pub limit: Option<u64>,
}

impl AuditQuery {
    /// Creates a query over all revision rows of an entity type.
    pub fn for_entity(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            entity_id: None,
            revision: None,
            orders: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Filters by entity identifier.
    pub fn entity_id(mut self, id: Value) -> Self {
        self.entity_id = Some(id);
        self
    }

    /// Filters by revision number.
    pub fn revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Appends an ordering term.
    pub fn order_by(mut self, property: AuditProperty, direction: SortDirection) -> Self {
        self.orders.push(AuditOrder {
            property,
            direction,
        });
        self
    }

    /// Skips this many rows before returning results.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_for_entity() {
        let query = AuditQuery::for_entity("Country");

        assert_eq!(query.entity_name, "Country");
        assert!(query.entity_id.is_none());
        assert!(query.orders.is_empty());
    }

    #[test]
    fn query_builder_chain() {
        let query = AuditQuery::for_entity("Country")
            .entity_id(serde_json::json!(1))
            .revision(4)
            .order_by(AuditProperty::RevisionTimestamp, SortDirection::Descending)
            .order_by(AuditProperty::RevisionNumber, SortDirection::Descending)
            .offset(10)
            .limit(5);

        assert_eq!(query.entity_id, Some(serde_json::json!(1)));
        assert_eq!(query.revision, Some(4));
        assert_eq!(query.orders.len(), 2);
        assert_eq!(query.orders[0].property, AuditProperty::RevisionTimestamp);
        assert_eq!(query.offset, Some(10));
        assert_eq!(query.limit, Some(5));
    }
}
