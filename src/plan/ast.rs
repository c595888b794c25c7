//! Constraint structures attached to fetch nodes
//!
//! Defines ordering, filtering and row limits that narrow a collection
//! reference before it is read or listened to.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the field path that compares against the document id itself.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

/// Filter operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    /// field < value
    #[serde(rename = "<")]
    Lt,
    /// field <= value
    #[serde(rename = "<=")]
    Lte,
    /// field == value
    #[serde(rename = "==")]
    Eq,
    /// field != value
    #[serde(rename = "!=")]
    Neq,
    /// field >= value
    #[serde(rename = ">=")]
    Gte,
    /// field > value
    #[serde(rename = ">")]
    Gt,
    /// Array field contains value
    #[serde(rename = "array-contains")]
    ArrayContains,
    /// Field equals one of the listed values
    #[serde(rename = "in")]
    In,
    /// Array field contains any of the listed values
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    /// Field equals none of the listed values
    #[serde(rename = "not-in")]
    NotIn,
}

impl FilterOp {
    /// Returns the operator as written in plans
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Eq => "==",
            FilterOp::Neq => "!=",
            FilterOp::Gte => ">=",
            FilterOp::Gt => ">",
            FilterOp::ArrayContains => "array-contains",
            FilterOp::In => "in",
            FilterOp::ArrayContainsAny => "array-contains-any",
            FilterOp::NotIn => "not-in",
        }
    }

    /// Returns true for operators whose operand must be a list
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOp::In | FilterOp::ArrayContainsAny | FilterOp::NotIn
        )
    }

    /// Returns true if this is a range operation
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Left-hand side of a filter: a named field or the document id sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldPath {
    /// A top-level field of the document data
    Field(String),
    /// The database-assigned document id
    DocumentId,
}

impl FieldPath {
    pub fn field(name: impl Into<String>) -> Self {
        FieldPath::from(name.into())
    }

    pub fn is_document_id(&self) -> bool {
        matches!(self, FieldPath::DocumentId)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        if value == DOCUMENT_ID_FIELD {
            FieldPath::DocumentId
        } else {
            FieldPath::Field(value)
        }
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::from(value.to_string())
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        match path {
            FieldPath::Field(name) => name,
            FieldPath::DocumentId => DOCUMENT_ID_FIELD.to_string(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Field(name) => f.write_str(name),
            FieldPath::DocumentId => f.write_str(DOCUMENT_ID_FIELD),
        }
    }
}

/// A single filter (field + operation + operand)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: FieldPath,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<FieldPath>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Equality filter
    pub fn eq(field: impl Into<FieldPath>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Filter on the document id itself
    pub fn document_id(op: FilterOp, value: Value) -> Self {
        Self::new(FieldPath::DocumentId, op, value)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Ordering specification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Everything that narrows a fetch node's reference.
///
/// Applied to the reference in a fixed order: ordering, filters, `limit`,
/// `limit_to_last`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub order: Option<OrderBy>,
    pub filters: Vec<Filter>,
    pub limit: Option<u32>,
    pub limit_to_last: Option<u32>,
}

impl Constraints {
    /// Returns true if nothing narrows the reference
    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.filters.is_empty()
            && self.limit.is_none()
            && self.limit_to_last.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_op_wire_names() {
        let op: FilterOp = serde_json::from_value(json!("array-contains-any")).unwrap();
        assert_eq!(op, FilterOp::ArrayContainsAny);
        assert_eq!(serde_json::to_value(FilterOp::Lte).unwrap(), json!("<="));
        assert!(FilterOp::NotIn.takes_list());
        assert!(!FilterOp::Eq.takes_list());
    }

    #[test]
    fn test_document_id_sentinel() {
        assert_eq!(FieldPath::from("__name__"), FieldPath::DocumentId);
        assert_eq!(FieldPath::from("title"), FieldPath::Field("title".into()));
        assert_eq!(String::from(FieldPath::DocumentId), DOCUMENT_ID_FIELD);
    }

    #[test]
    fn test_empty_constraints() {
        assert!(Constraints::default().is_empty());

        let constraints = Constraints {
            limit: Some(3),
            ..Default::default()
        };
        assert!(!constraints.is_empty());
    }

    #[test]
    fn test_order_by() {
        let order = OrderBy::desc("created_at");
        assert_eq!(order.direction, SortDirection::Desc);
        assert_eq!(order.direction.as_str(), "desc");
    }
}
