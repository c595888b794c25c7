//! Result ordering for in-memory queries
//!
//! Sorts documents by a single field, deterministically.

use std::cmp::Ordering;

use serde_json::Value;

use super::snapshot::DocumentSnapshot;
use crate::plan::{OrderBy, SortDirection};

/// Sorts document snapshots
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts documents according to the ordering.
    ///
    /// Sort is stable; documents that tie keep their incoming (id) order.
    pub fn sort(documents: &mut [DocumentSnapshot], order: &OrderBy) {
        documents.sort_by(|a, b| {
            let a_val = a.data().and_then(|d| d.get(&order.field));
            let b_val = b.data().and_then(|d| d.get(&order.field));

            let ordering = match (a_val, b_val) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a_val), Some(b_val)) => compare_values(a_val, b_val),
            };

            match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
}

/// Rank of a value's type in the total order:
/// null < bool < number < string < array < object
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compares two JSON values, ranking by type first.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (a_rank, b_rank) = (type_rank(a), type_rank(b));
    if a_rank != b_rank {
        return a_rank.cmp(&b_rank);
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => Ordering::Equal,
    }
}

/// Returns true if both values have the same type rank
pub(crate) fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}
