//! Reference cache
//!
//! Memoizes backend references for one invocation, keyed by the node's
//! structural key plus whatever scopes it: the parent document for
//! subcollections, the target id for foreign-key dereferences. Repeated
//! live passes and structurally identical siblings therefore share one
//! reference handle instead of issuing duplicate queries.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::errors::{ResolveError, ResolveResult};
use crate::observability::{Event, ResolverMetrics};
use crate::plan::QueryNode;
use crate::store::{DocumentPath, DocumentSnapshot, Reference};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReferenceKey {
    shape: String,
    parent: Option<(Option<String>, DocumentPath)>,
    document: Option<String>,
}

/// Per-invocation memo of backend references
#[derive(Debug)]
pub struct ReferenceCache {
    entries: HashMap<ReferenceKey, Arc<Reference>>,
    metrics: Arc<ResolverMetrics>,
}

impl ReferenceCache {
    pub fn new(metrics: Arc<ResolverMetrics>) -> Self {
        Self {
            entries: HashMap::new(),
            metrics,
        }
    }

    /// Returns the cached reference for this node in this scope, building
    /// it on first use.
    ///
    /// `parent` is the fetch node whose documents are in scope (absent at
    /// the root), `parent_document` the document the current value came
    /// from, and `current` the field value used as the target id of a
    /// foreign-key dereference.
    ///
    /// A null foreign key names no document. Callers settle it as null
    /// without asking the cache; passing one here is a
    /// [`ResolveError::ReferenceConstruction`].
    pub fn get_or_create(
        &mut self,
        node: &QueryNode,
        parent: Option<&QueryNode>,
        parent_document: Option<&DocumentSnapshot>,
        current: &Value,
    ) -> ResolveResult<Arc<Reference>> {
        let key = Self::key(node, parent, parent_document, current)?;
        if let Some(reference) = self.entries.get(&key) {
            self.metrics.increment_cache_hits();
            trace!(event = %Event::ReferenceReused, reference = %reference);
            return Ok(Arc::clone(reference));
        }

        let reference = Arc::new(Self::build(node, parent, parent_document, key.document.as_deref())?);
        self.metrics.increment_cache_misses();
        self.entries.insert(key, Arc::clone(&reference));
        Ok(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(
        node: &QueryNode,
        parent: Option<&QueryNode>,
        parent_document: Option<&DocumentSnapshot>,
        current: &Value,
    ) -> ResolveResult<ReferenceKey> {
        let mut key = ReferenceKey {
            shape: node.structural_key().to_string(),
            parent: None,
            document: None,
        };

        if let Some(name) = node.subcollection() {
            match (parent, parent_document) {
                (Some(parent), Some(document)) => {
                    key.parent = Some((
                        parent.collection().map(str::to_string),
                        document.path().clone(),
                    ));
                }
                _ => {
                    return Err(ResolveError::ReferenceConstruction(format!(
                        "subcollection '{}' on node '{}' reached without a parent document",
                        name,
                        node.name()
                    )))
                }
            }
        }

        if node.collection().is_some() && parent.is_some() {
            match document_id(current)? {
                Some(id) => key.document = Some(id),
                // Callers filter null foreign keys before lookup
                None => {
                    return Err(ResolveError::ReferenceConstruction(format!(
                        "foreign key '{}' has no value",
                        node.name()
                    )))
                }
            }
        }

        Ok(key)
    }

    fn build(
        node: &QueryNode,
        parent: Option<&QueryNode>,
        parent_document: Option<&DocumentSnapshot>,
        document: Option<&str>,
    ) -> ResolveResult<Reference> {
        let reference = match (node.subcollection(), node.collection()) {
            (Some(name), _) => {
                let document = parent_document.ok_or_else(|| {
                    ResolveError::ReferenceConstruction(format!(
                        "subcollection '{}' reached without a parent document",
                        name
                    ))
                })?;
                Reference::subcollection(document.path(), name)
            }
            (None, Some(name)) => {
                let reference = Reference::collection(name);
                match (parent, document) {
                    (Some(_), Some(id)) => reference.doc(id).map_err(construction)?,
                    _ => reference,
                }
            }
            (None, None) => {
                return Err(ResolveError::ReferenceConstruction(format!(
                    "node '{}' has no collection or subcollection",
                    node.name()
                )))
            }
        };

        match node.constraints() {
            Some(constraints) => reference.constrain(constraints).map_err(construction),
            None => Ok(reference),
        }
    }
}

fn construction(err: crate::store::StoreError) -> ResolveError {
    ResolveError::ReferenceConstruction(err.to_string())
}

/// Interprets a field value as a document id.
///
/// `null` means "no target"; strings are used verbatim and numbers by their
/// decimal rendering. Anything else cannot name a document.
pub(crate) fn document_id(value: &Value) -> ResolveResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(ResolveError::ReferenceConstruction(format!(
            "value {} cannot be used as a document id",
            other
        ))),
    }
}
