//! Backend references
//!
//! A [`Reference`] names what to read: a collection (top-level or nested
//! under a document) narrowed by ordering, filters and limits, or a single
//! document.

use std::fmt;

use serde::Serialize;

use super::errors::{StoreError, StoreResult};
use crate::plan::{Constraints, Filter, OrderBy};

/// One `collection/id` step of a document path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PathSegment {
    pub collection: String,
    pub id: String,
}

/// Full path of a document, e.g. `posts/a/comments/c1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentPath(Vec<PathSegment>);

impl DocumentPath {
    /// Path of a document in a top-level collection
    pub fn root(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self(vec![PathSegment {
            collection: collection.into(),
            id: id.into(),
        }])
    }

    /// Path of a document in a subcollection of this document
    pub fn child(&self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment {
            collection: collection.into(),
            id: id.into(),
        });
        Self(segments)
    }

    /// Parses `a/1/b/2` style paths. Returns `None` for odd segment counts.
    pub fn parse(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() || parts.len() % 2 != 0 {
            return None;
        }
        let segments = parts
            .chunks(2)
            .map(|pair| PathSegment {
                collection: pair[0].to_string(),
                id: pair[1].to_string(),
            })
            .collect();
        Some(Self(segments))
    }

    /// Document id (last segment)
    pub fn id(&self) -> &str {
        self.0.last().map(|s| s.id.as_str()).unwrap_or_default()
    }

    /// Name of the collection directly containing the document
    pub fn collection(&self) -> &str {
        self.0.last().map(|s| s.collection.as_str()).unwrap_or_default()
    }

    /// Path of the document owning the containing collection, if nested
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}/{}", segment.collection, segment.id)?;
        }
        Ok(())
    }
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Target {
    /// A collection, optionally nested under a document
    Collection {
        parent: Option<DocumentPath>,
        name: String,
    },
    /// A single document
    Document(DocumentPath),
}

/// A backend reference/query handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    target: Target,
    order: Option<OrderBy>,
    filters: Vec<Filter>,
    limit: Option<u32>,
    limit_to_last: Option<u32>,
}

impl Reference {
    fn new(target: Target) -> Self {
        Self {
            target,
            order: None,
            filters: Vec::new(),
            limit: None,
            limit_to_last: None,
        }
    }

    /// Top-level collection
    pub fn collection(name: impl Into<String>) -> Self {
        Self::new(Target::Collection {
            parent: None,
            name: name.into(),
        })
    }

    /// Collection nested under `parent`
    pub fn subcollection(parent: &DocumentPath, name: impl Into<String>) -> Self {
        Self::new(Target::Collection {
            parent: Some(parent.clone()),
            name: name.into(),
        })
    }

    /// Single document by full path
    pub fn document(path: DocumentPath) -> Self {
        Self::new(Target::Document(path))
    }

    /// Narrows a plain collection reference to one of its documents
    pub fn doc(self, id: impl Into<String>) -> StoreResult<Self> {
        self.ensure_unconstrained("doc")?;
        match self.target {
            Target::Collection { parent, name } => {
                let path = match parent {
                    Some(parent) => parent.child(name, id),
                    None => DocumentPath::root(name, id),
                };
                Ok(Self::document(path))
            }
            Target::Document(path) => Err(StoreError::InvalidArgument(format!(
                "Cannot take a document of document reference {}",
                path
            ))),
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> StoreResult<Self> {
        self.ensure_collection("orderBy")?;
        self.order = Some(order);
        Ok(self)
    }

    pub fn filter(mut self, filter: Filter) -> StoreResult<Self> {
        self.ensure_collection("where")?;
        self.filters.push(filter);
        Ok(self)
    }

    pub fn limit(mut self, limit: u32) -> StoreResult<Self> {
        self.ensure_collection("limit")?;
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn limit_to_last(mut self, limit: u32) -> StoreResult<Self> {
        self.ensure_collection("limitToLast")?;
        self.limit_to_last = Some(limit);
        Ok(self)
    }

    /// Applies constraints in their fixed order: ordering, filters, limit,
    /// limit-to-last.
    pub fn constrain(self, constraints: &Constraints) -> StoreResult<Self> {
        let mut reference = self;
        if let Some(order) = &constraints.order {
            reference = reference.order_by(order.clone())?;
        }
        for filter in &constraints.filters {
            reference = reference.filter(filter.clone())?;
        }
        if let Some(limit) = constraints.limit {
            reference = reference.limit(limit)?;
        }
        if let Some(limit) = constraints.limit_to_last {
            reference = reference.limit_to_last(limit)?;
        }
        Ok(reference)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn order(&self) -> Option<&OrderBy> {
        self.order.as_ref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn row_limit_to_last(&self) -> Option<u32> {
        self.limit_to_last
    }

    pub fn is_document(&self) -> bool {
        matches!(self.target, Target::Document(_))
    }

    fn ensure_collection(&self, op: &str) -> StoreResult<()> {
        match &self.target {
            Target::Collection { .. } => Ok(()),
            Target::Document(path) => Err(StoreError::InvalidArgument(format!(
                "{} is not supported on document reference {}",
                op, path
            ))),
        }
    }

    fn ensure_unconstrained(&self, op: &str) -> StoreResult<()> {
        if self.order.is_some()
            || !self.filters.is_empty()
            || self.limit.is_some()
            || self.limit_to_last.is_some()
        {
            return Err(StoreError::InvalidArgument(format!(
                "{} is not supported on a constrained query",
                op
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Collection {
                parent: Some(parent),
                name,
            } => write!(f, "{}/{}", parent, name),
            Target::Collection { parent: None, name } => f.write_str(name),
            Target::Document(path) => write!(f, "{}", path),
        }
    }
}
