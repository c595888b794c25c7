//! # Document Store Boundary
//!
//! What the resolver needs from a hierarchical document database:
//!
//! - **References**: collections (top-level or nested under a document),
//!   narrowed by ordering, filters and limits, or single documents
//! - **fetch**: read a reference once
//! - **listen**: receive a snapshot now and after every change until the
//!   returned [`Unsubscribe`] runs
//!
//! [`MemoryStore`] implements the boundary in process.

mod errors;
mod filters;
pub mod memory;
mod reference;
mod snapshot;
mod sorter;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use errors::{StoreError, StoreResult};
pub use filters::FilterEvaluator;
pub use memory::MemoryStore;
pub use reference::{DocumentPath, PathSegment, Reference, Target};
pub use snapshot::{DocumentSnapshot, Snapshot};
pub use sorter::ResultSorter;

/// Detaches a listener. Runs at most once.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Event pushed by a backend into a listener
#[derive(Debug, Clone)]
pub enum ListenEvent {
    /// Current state of the listened reference
    Next(Snapshot),
    /// Listener failure
    Error(StoreError),
}

/// Receiving end of a listener, handed to [`DocumentStore::listen`]
#[derive(Clone)]
pub struct SnapshotSink {
    deliver: Arc<dyn Fn(ListenEvent) + Send + Sync>,
}

impl SnapshotSink {
    pub fn new(deliver: impl Fn(ListenEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Pushes a new snapshot
    pub fn next(&self, snapshot: Snapshot) {
        (self.deliver)(ListenEvent::Next(snapshot));
    }

    /// Reports a listener failure
    pub fn error(&self, error: StoreError) {
        (self.deliver)(ListenEvent::Error(error));
    }
}

impl fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSink").finish_non_exhaustive()
    }
}

/// A hierarchical document database.
///
/// Implementations must never call back into the sink synchronously with
/// locks held that the caller of `listen` could need; the resolver only
/// queues events from the sink, so delivering from inside `listen` is fine.
pub trait DocumentStore: Send + Sync {
    /// Reads the reference once
    fn fetch(&self, reference: Arc<Reference>) -> BoxFuture<'static, StoreResult<Snapshot>>;

    /// Attaches a listener to the reference
    fn listen(&self, reference: Arc<Reference>, sink: SnapshotSink) -> Unsubscribe;
}
