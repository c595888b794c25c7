//! # In-Memory Document Store
//!
//! Process-local implementation of [`DocumentStore`]. Documents live in
//! nested collections keyed by [`DocumentPath`]; listeners get the current
//! snapshot on attach and a fresh one after every write touching their
//! reference.
//!
//! A store built with [`MemoryStore::recording`] also logs every reference
//! it is asked to serve, so callers can check which (and how many distinct)
//! reference handles were used. The default store keeps no such log.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::filters::FilterEvaluator;
use super::reference::{DocumentPath, Reference, Target};
use super::snapshot::{DocumentSnapshot, Snapshot};
use super::sorter::ResultSorter;
use super::{DocumentStore, SnapshotSink, Unsubscribe};

#[derive(Debug)]
struct Listener {
    reference: Arc<Reference>,
    sink: SnapshotSink,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<DocumentPath, Map<String, Value>>,
    listeners: HashMap<u64, Listener>,
    next_listener: u64,
    record_served: bool,
    served: Vec<Arc<Reference>>,
    fetch_failure: Option<StoreError>,
}

impl Inner {
    fn evaluate(&self, reference: &Reference) -> Snapshot {
        match reference.target() {
            Target::Document(path) => Snapshot::Document(match self.documents.get(path) {
                Some(data) => DocumentSnapshot::new(path.clone(), data.clone()),
                None => DocumentSnapshot::missing(path.clone()),
            }),
            Target::Collection { parent, name } => {
                let mut documents: Vec<DocumentSnapshot> = self
                    .documents
                    .iter()
                    .filter(|(path, _)| {
                        path.collection() == name && path.parent().as_ref() == parent.as_ref()
                    })
                    .map(|(path, data)| DocumentSnapshot::new(path.clone(), data.clone()))
                    .filter(|doc| FilterEvaluator::matches(doc, reference.filters()))
                    .collect();

                if let Some(order) = reference.order() {
                    // Ordering by a field excludes documents without it
                    documents.retain(|doc| {
                        doc.data()
                            .map(|data| data.contains_key(&order.field))
                            .unwrap_or(false)
                    });
                    ResultSorter::sort(&mut documents, order);
                }
                if let Some(limit) = reference.row_limit() {
                    documents.truncate(limit as usize);
                }
                if let Some(limit) = reference.row_limit_to_last() {
                    let skip = documents.len().saturating_sub(limit as usize);
                    documents.drain(..skip);
                }

                Snapshot::Query(documents)
            }
        }
    }

    /// Listeners whose reference can observe a write to `path`, paired
    /// with their new snapshot
    fn affected(&self, path: &DocumentPath) -> Vec<(SnapshotSink, Snapshot)> {
        self.listeners
            .values()
            .filter(|listener| match listener.reference.target() {
                Target::Document(target) => target == path,
                Target::Collection { parent, name } => {
                    path.collection() == name && path.parent().as_ref() == parent.as_ref()
                }
            })
            .map(|listener| {
                (
                    listener.sink.clone(),
                    self.evaluate(&listener.reference),
                )
            })
            .collect()
    }
}

/// In-process document database
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that logs every reference handed to `fetch` or `listen`
    pub fn recording() -> Self {
        let store = Self::default();
        store.lock().record_served = true;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a document, replacing any previous data, and notifies
    /// affected listeners.
    pub fn set(&self, path: DocumentPath, data: Value) -> StoreResult<()> {
        let Value::Object(data) = data else {
            return Err(StoreError::InvalidArgument(format!(
                "Document data for {} must be an object",
                path
            )));
        };

        let notifications = {
            let mut inner = self.lock();
            inner.documents.insert(path.clone(), data);
            inner.affected(&path)
        };
        for (sink, snapshot) in notifications {
            sink.next(snapshot);
        }
        Ok(())
    }

    /// Writes a document into a top-level collection
    pub fn insert(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        self.set(DocumentPath::root(collection, id), data)
    }

    /// Deletes a document. Returns whether it existed.
    pub fn delete(&self, path: &DocumentPath) -> bool {
        let (existed, notifications) = {
            let mut inner = self.lock();
            let existed = inner.documents.remove(path).is_some();
            (existed, inner.affected(path))
        };
        if existed {
            for (sink, snapshot) in notifications {
                sink.next(snapshot);
            }
        }
        existed
    }

    /// Current data of a document
    pub fn get(&self, path: &DocumentPath) -> Option<Map<String, Value>> {
        self.lock().documents.get(path).cloned()
    }

    /// Evaluates a reference against the current data
    pub fn snapshot(&self, reference: &Reference) -> Snapshot {
        self.lock().evaluate(reference)
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Every reference handed to `fetch` or `listen`, in call order. Always
    /// empty unless the store was built with [`MemoryStore::recording`].
    pub fn served_references(&self) -> Vec<Arc<Reference>> {
        self.lock().served.clone()
    }

    /// Makes every subsequent fetch fail with `error` (or succeed again
    /// with `None`)
    pub fn fail_fetches(&self, error: Option<StoreError>) {
        self.lock().fetch_failure = error;
    }

    /// Reports `error` to every listener on the named collection, or on a
    /// document inside it. Returns how many listeners were notified.
    pub fn fail_listeners(&self, collection: &str, error: StoreError) -> usize {
        let sinks: Vec<SnapshotSink> = {
            let inner = self.lock();
            inner
                .listeners
                .values()
                .filter(|listener| match listener.reference.target() {
                    Target::Collection { name, .. } => name == collection,
                    Target::Document(path) => path.collection() == collection,
                })
                .map(|listener| listener.sink.clone())
                .collect()
        };
        for sink in &sinks {
            sink.error(error.clone());
        }
        sinks.len()
    }
}

impl DocumentStore for MemoryStore {
    fn fetch(&self, reference: Arc<Reference>) -> BoxFuture<'static, StoreResult<Snapshot>> {
        let result = {
            let mut inner = self.lock();
            if inner.record_served {
                inner.served.push(Arc::clone(&reference));
            }
            match &inner.fetch_failure {
                Some(error) => Err(error.clone()),
                None => Ok(inner.evaluate(&reference)),
            }
        };
        future::ready(result).boxed()
    }

    fn listen(&self, reference: Arc<Reference>, sink: SnapshotSink) -> Unsubscribe {
        let (id, initial) = {
            let mut inner = self.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            if inner.record_served {
                inner.served.push(Arc::clone(&reference));
            }
            let initial = inner.evaluate(&reference);
            inner.listeners.insert(
                id,
                Listener {
                    reference,
                    sink: sink.clone(),
                },
            );
            (id, initial)
        };
        sink.next(initial);

        let inner = Arc::clone(&self.inner);
        Box::new(move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .remove(&id);
        })
    }
}
