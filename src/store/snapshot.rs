//! Snapshots returned by fetches and listeners

use serde_json::{Map, Value};

use super::reference::DocumentPath;

/// A single document as read from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    path: DocumentPath,
    data: Option<Map<String, Value>>,
}

impl DocumentSnapshot {
    /// Snapshot of an existing document
    pub fn new(path: DocumentPath, data: Map<String, Value>) -> Self {
        Self {
            path,
            data: Some(data),
        }
    }

    /// Snapshot of a deleted or never-written document
    pub fn missing(path: DocumentPath) -> Self {
        Self { path, data: None }
    }

    /// Database-assigned document id
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Field data, `None` if the document does not exist
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// Result of reading a reference
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// One document (document references)
    Document(DocumentSnapshot),
    /// Ordered result set (collection references)
    Query(Vec<DocumentSnapshot>),
}

impl Snapshot {
    /// Shape name used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            Snapshot::Document(_) => "document",
            Snapshot::Query(_) => "query",
        }
    }
}
