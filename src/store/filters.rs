//! Filter evaluation for in-memory queries
//!
//! All filters on a reference must match (AND semantics). A document
//! missing the filtered field never matches, whatever the operator.

use std::cmp::Ordering;

use serde_json::Value;

use super::snapshot::DocumentSnapshot;
use super::sorter::{compare_values, same_type};
use crate::plan::{FieldPath, Filter, FilterOp};

/// Evaluates filters against document snapshots
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Checks if a document matches all filters
    pub fn matches(document: &DocumentSnapshot, filters: &[Filter]) -> bool {
        filters
            .iter()
            .all(|filter| Self::matches_filter(document, filter))
    }

    fn matches_filter(document: &DocumentSnapshot, filter: &Filter) -> bool {
        let id_value;
        let actual = match &filter.field {
            FieldPath::DocumentId => {
                id_value = Value::String(document.id().to_string());
                &id_value
            }
            FieldPath::Field(name) => match document.data().and_then(|d| d.get(name)) {
                Some(v) => v,
                None => return false,
            },
        };

        let operand = &filter.value;
        match filter.op {
            FilterOp::Eq => values_equal(actual, operand),
            FilterOp::Neq => !actual.is_null() && !values_equal(actual, operand),
            FilterOp::Lt => Self::range(actual, operand, |o| o == Ordering::Less),
            FilterOp::Lte => Self::range(actual, operand, |o| o != Ordering::Greater),
            FilterOp::Gt => Self::range(actual, operand, |o| o == Ordering::Greater),
            FilterOp::Gte => Self::range(actual, operand, |o| o != Ordering::Less),
            FilterOp::ArrayContains => match actual {
                Value::Array(items) => items.iter().any(|item| values_equal(item, operand)),
                _ => false,
            },
            FilterOp::In => Self::list(operand)
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
            FilterOp::ArrayContainsAny => match actual {
                Value::Array(items) => items.iter().any(|item| {
                    Self::list(operand)
                        .iter()
                        .any(|candidate| values_equal(item, candidate))
                }),
                _ => false,
            },
            FilterOp::NotIn => {
                !actual.is_null()
                    && !Self::list(operand)
                        .iter()
                        .any(|candidate| values_equal(actual, candidate))
            }
        }
    }

    /// Range comparison, only between values of the same type
    fn range(actual: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
        if actual.is_null() || !same_type(actual, bound) {
            return false;
        }
        accept(compare_values(actual, bound))
    }

    fn list(operand: &Value) -> &[Value] {
        operand.as_array().map(Vec::as_slice).unwrap_or_default()
    }
}

/// Equality with numeric normalization (`1 == 1.0`)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}
