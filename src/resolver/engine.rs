//! # Resolution Engine
//!
//! Walks a query forest against a [`DocumentStore`], composing the output
//! tree and tracking when it is fully settled.
//!
//! ## Model
//!
//! - A **frame** is one recursive resolution of a forest over one parent
//!   value (an object, or an array whose elements each get the forest).
//!   Frames live in an arena owned by the [`Resolver`] and are addressed by
//!   id; ids are never reused, so anything addressed to a torn-down frame
//!   is simply dropped.
//! - A **slot** is one unit of asynchronous work inside a frame: a fetch
//!   node, one id of a foreign-key list, or a nested object waiting on its
//!   child frame. Each slot is `Pending` or `Settled`; the frame counts
//!   both and is complete when `loaded_refs == total_refs`.
//! - A **settlement** is a message `(target, value)` delivered to exactly
//!   one upstream: the parent frame's slot, or the caller at the root.
//!
//! Store callbacks never touch the arena directly. Fetch results and
//! listener events are queued on the invocation inbox and applied one at a
//! time through [`Resolver::handle`], and every settlement they cause is
//! processed before the next message is taken.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use super::cache::ReferenceCache;
use super::errors::{ResolveError, ResolveResult};
use super::normalize::Normalizer;
use crate::observability::{Event, ResolverMetrics};
use crate::plan::{Forest, NodeKind, QueryNode};
use crate::store::{
    DocumentSnapshot, DocumentStore, ListenEvent, Snapshot, SnapshotSink, StoreError, Unsubscribe,
};

pub type FrameId = u64;

/// Execution mode of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Read every reference once and emit exactly one value
    Query,
    /// Listen to every reference and emit on every settled change
    Subscribe,
}

/// Settlement state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Settled,
}

/// Reference counters of the root frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total_refs: usize,
    pub loaded_refs: usize,
}

impl Progress {
    pub fn is_settled(&self) -> bool {
        self.loaded_refs == self.total_refs
    }
}

/// Address of a slot inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotAddr {
    frame: FrameId,
    slot: usize,
}

/// Backend traffic routed to the resolver
#[derive(Debug)]
pub(crate) enum Inbound {
    Snapshot { target: SlotAddr, snapshot: Snapshot },
    Failed { target: SlotAddr, error: StoreError },
}

/// Values (and errors) leaving the resolver
pub(crate) type Emission = ResolveResult<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    Root,
    Slot(SlotAddr),
}

#[derive(Debug)]
struct Settlement {
    target: Upstream,
    /// Child frame that produced the value; `None` when a fetch settled
    /// its slot directly
    source: Option<FrameId>,
    value: Value,
}

#[derive(Debug)]
struct Slot {
    node: usize,
    element: Option<usize>,
    item: Option<usize>,
    state: SlotState,
    child: Option<FrameId>,
}

/// Parent context for a frame: the fetch node whose documents are in
/// scope, and those documents.
#[derive(Debug, Clone)]
struct Scope {
    forest: Forest,
    node: usize,
    documents: Arc<[DocumentSnapshot]>,
    /// Fixed document index; `None` means one document per array element
    position: Option<usize>,
}

impl Scope {
    fn parent(&self) -> &QueryNode {
        &self.forest[self.node]
    }

    fn document(&self, element: Option<usize>) -> Option<&DocumentSnapshot> {
        self.position
            .or(element)
            .and_then(|index| self.documents.get(index))
    }

    /// Scope seen by a nested object inside array element `element`
    fn pinned(&self, element: Option<usize>) -> Scope {
        Scope {
            position: self.position.or(element),
            ..self.clone()
        }
    }
}

struct Frame {
    forest: Forest,
    scope: Option<Scope>,
    value: Value,
    slots: Vec<Slot>,
    total_refs: usize,
    loaded_refs: usize,
    set_up: bool,
    upstream: Upstream,
    listeners: Vec<Unsubscribe>,
    fetches: Vec<AbortHandle>,
}

/// State of one invocation: frame arena, reference cache and settlement
/// queue.
pub(crate) struct Resolver {
    invocation: Uuid,
    store: Arc<dyn DocumentStore>,
    mode: OperationMode,
    cache: ReferenceCache,
    normalizer: Normalizer,
    metrics: Arc<ResolverMetrics>,
    frames: HashMap<FrameId, Frame>,
    next_frame: FrameId,
    root: Option<FrameId>,
    inbox: Option<mpsc::UnboundedSender<Inbound>>,
    output: Option<mpsc::UnboundedSender<Emission>>,
    queue: VecDeque<Settlement>,
    closed: bool,
}

impl Resolver {
    pub(crate) fn new(
        invocation: Uuid,
        store: Arc<dyn DocumentStore>,
        mode: OperationMode,
        normalizer: Normalizer,
        metrics: Arc<ResolverMetrics>,
        inbox: mpsc::UnboundedSender<Inbound>,
        output: mpsc::UnboundedSender<Emission>,
    ) -> Self {
        Self {
            invocation,
            store,
            mode,
            cache: ReferenceCache::new(Arc::clone(&metrics)),
            normalizer,
            metrics,
            frames: HashMap::new(),
            next_frame: 0,
            root: None,
            inbox: Some(inbox),
            output: Some(output),
            queue: VecDeque::new(),
            closed: false,
        }
    }

    /// Walks the root forest. Structural errors found during the walk are
    /// returned here and leave nothing attached.
    pub(crate) fn start(&mut self, forest: Forest, parent: Value) -> ResolveResult<()> {
        self.metrics.increment_invocations();
        debug!(
            event = %Event::InvocationStart,
            invocation = %self.invocation,
            mode = ?self.mode,
            nodes = forest.len()
        );

        match self.open_frame(forest, None, parent, Upstream::Root) {
            Ok(root) => {
                self.root = Some(root);
                self.drain();
                Ok(())
            }
            Err(err) => {
                error!(
                    event = %Event::ResolutionFailed,
                    invocation = %self.invocation,
                    code = err.code(),
                    error = %err
                );
                self.shutdown();
                Err(err)
            }
        }
    }

    /// Applies one backend message and everything it settles
    pub(crate) fn handle(&mut self, message: Inbound) {
        if self.closed {
            return;
        }
        let result = match message {
            Inbound::Snapshot { target, snapshot } => self.apply_snapshot(target, snapshot),
            Inbound::Failed { target, error } => {
                self.backend_failure(target, error);
                Ok(())
            }
        };
        match result {
            Ok(()) => self.drain(),
            Err(err) => self.fail(err),
        }
    }

    /// Detaches every listener, aborts in-flight fetches and closes the
    /// output. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(root) = self.root.take() {
            self.teardown(root);
        }
        let orphans: Vec<FrameId> = self.frames.keys().copied().collect();
        for id in orphans {
            self.teardown(id);
        }
        self.queue.clear();
        self.inbox = None;
        self.output = None;

        debug!(event = %Event::InvocationStop, invocation = %self.invocation);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn progress(&self) -> Option<Progress> {
        let frame = self.frames.get(&self.root?)?;
        Some(Progress {
            total_refs: frame.total_refs,
            loaded_refs: frame.loaded_refs,
        })
    }

    // ------------------------------------------------------------------
    // Walking
    // ------------------------------------------------------------------

    fn open_frame(
        &mut self,
        forest: Forest,
        scope: Option<Scope>,
        parent: Value,
        upstream: Upstream,
    ) -> ResolveResult<FrameId> {
        let id = self.next_frame;
        self.next_frame += 1;

        let value = match &parent {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        if item.is_null() {
                            Value::Null
                        } else {
                            Value::Object(Map::new())
                        }
                    })
                    .collect(),
            ),
            Value::Null => Value::Null,
            _ => Value::Object(Map::new()),
        };

        self.frames.insert(
            id,
            Frame {
                forest: Arc::clone(&forest),
                scope,
                value,
                slots: Vec::new(),
                total_refs: 0,
                loaded_refs: 0,
                set_up: false,
                upstream,
                listeners: Vec::new(),
                fetches: Vec::new(),
            }
        );

        if let Err(err) = self.walk(id, &forest, &parent) {
            self.teardown(id);
            return Err(err);
        }

        if let Some(frame) = self.frames.get_mut(&id) {
            frame.set_up = true;
        }
        self.check_complete(id);
        Ok(id)
    }

    fn walk(&mut self, frame: FrameId, forest: &Forest, parent: &Value) -> ResolveResult<()> {
        match parent {
            Value::Array(items) => {
                for (element, item) in items.iter().enumerate() {
                    if item.is_null() {
                        continue;
                    }
                    for index in 0..forest.len() {
                        self.open_node(frame, forest, index, Some(element), item)?;
                    }
                }
            }
            Value::Null => {}
            _ => {
                for index in 0..forest.len() {
                    self.open_node(frame, forest, index, None, parent)?;
                }
            }
        }
        Ok(())
    }

    fn open_node(
        &mut self,
        frame: FrameId,
        forest: &Forest,
        index: usize,
        element: Option<usize>,
        parent: &Value,
    ) -> ResolveResult<()> {
        let node = &forest[index];
        let current = parent.get(node.name()).cloned().unwrap_or(Value::Null);

        match node.kind() {
            NodeKind::Leaf => {
                if let Some(f) = self.frames.get_mut(&frame) {
                    place(&mut f.value, element, None, node.alias(), current);
                }
                Ok(())
            }
            NodeKind::Object => {
                let Some(children) = node.children().map(Arc::clone) else {
                    return Ok(());
                };
                let scope = self
                    .frames
                    .get(&frame)
                    .and_then(|f| f.scope.as_ref())
                    .map(|scope| scope.pinned(element));
                let Some(slot) = self.push_slot(frame, index, element, None) else {
                    return Ok(());
                };
                let target = SlotAddr { frame, slot };
                let child = self.open_frame(children, scope, current, Upstream::Slot(target))?;
                self.set_child(target, Some(child));
                Ok(())
            }
            NodeKind::Collection | NodeKind::Subcollection => {
                let foreign_key = node.kind() == NodeKind::Collection && self.has_scope(frame);
                if foreign_key {
                    if let Value::Array(ids) = &current {
                        if let Some(f) = self.frames.get_mut(&frame) {
                            let empty = Value::Array(vec![Value::Null; ids.len()]);
                            place(&mut f.value, element, None, node.alias(), empty);
                        }
                        for (item, id) in ids.iter().enumerate() {
                            self.open_fetch(frame, forest, index, element, Some(item), id)?;
                        }
                        return Ok(());
                    }
                }
                self.open_fetch(frame, forest, index, element, None, &current)
            }
        }
    }

    fn open_fetch(
        &mut self,
        frame: FrameId,
        forest: &Forest,
        index: usize,
        element: Option<usize>,
        item: Option<usize>,
        current: &Value,
    ) -> ResolveResult<()> {
        let node = &forest[index];
        let scope = self.frames.get(&frame).and_then(|f| f.scope.clone());
        let Some(slot) = self.push_slot(frame, index, element, item) else {
            return Ok(());
        };
        let target = SlotAddr { frame, slot };

        // A foreign key with no value points at nothing
        if node.collection().is_some() && scope.is_some() && current.is_null() {
            self.queue.push_back(Settlement {
                target: Upstream::Slot(target),
                source: None,
                value: Value::Null,
            });
            return Ok(());
        }

        let reference = self.cache.get_or_create(
            node,
            scope.as_ref().map(Scope::parent),
            scope.as_ref().and_then(|s| s.document(element)),
            current,
        )?;
        let Some(inbox) = self.inbox.clone() else {
            return Ok(());
        };

        match self.mode {
            OperationMode::Query => {
                let request = self.store.fetch(Arc::clone(&reference));
                let task = tokio::spawn(async move {
                    let message = match request.await {
                        Ok(snapshot) => Inbound::Snapshot { target, snapshot },
                        Err(error) => Inbound::Failed { target, error },
                    };
                    let _ = inbox.send(message);
                });
                self.metrics.increment_fetches();
                trace!(
                    event = %Event::FetchIssued,
                    invocation = %self.invocation,
                    frame,
                    reference = %reference
                );
                if let Some(f) = self.frames.get_mut(&frame) {
                    f.fetches.push(task.abort_handle());
                }
            }
            OperationMode::Subscribe => {
                let sink = SnapshotSink::new(move |event| {
                    let message = match event {
                        ListenEvent::Next(snapshot) => Inbound::Snapshot { target, snapshot },
                        ListenEvent::Error(error) => Inbound::Failed { target, error },
                    };
                    let _ = inbox.send(message);
                });
                let unsubscribe = self.store.listen(Arc::clone(&reference), sink);
                self.metrics.increment_listeners_attached();
                trace!(
                    event = %Event::ListenerAttached,
                    invocation = %self.invocation,
                    frame,
                    reference = %reference
                );
                if let Some(f) = self.frames.get_mut(&frame) {
                    f.listeners.push(unsubscribe);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Backend messages
    // ------------------------------------------------------------------

    fn apply_snapshot(&mut self, target: SlotAddr, snapshot: Snapshot) -> ResolveResult<()> {
        let Some(frame) = self.frames.get(&target.frame) else {
            trace!(
                event = %Event::SnapshotDiscarded,
                invocation = %self.invocation,
                frame = target.frame
            );
            return Ok(());
        };
        let Some(slot) = frame.slots.get(target.slot) else {
            return Ok(());
        };
        let forest = Arc::clone(&frame.forest);
        let index = slot.node;
        let previous = slot.child;
        let node = &forest[index];
        let foreign_key = node.collection().is_some() && frame.scope.is_some();

        let (value, documents) = match snapshot {
            Snapshot::Query(documents) if !foreign_key => {
                let records = documents
                    .iter()
                    .map(|document| self.normalizer.to_value(document, node))
                    .collect();
                (Value::Array(records), documents)
            }
            Snapshot::Document(document) if foreign_key => {
                (self.normalizer.to_value(&document, node), vec![document])
            }
            other => {
                return Err(ResolveError::UnexpectedSnapshotShape {
                    node: node.name().to_string(),
                    expected: if foreign_key { "document" } else { "query" },
                    found: other.shape(),
                })
            }
        };

        // A newer snapshot supersedes whatever the last one started
        if let Some(previous) = previous {
            self.teardown(previous);
            self.set_child(target, None);
        }

        let children = match node.children() {
            Some(children) if !is_empty_result(&value) => Arc::clone(children),
            _ => {
                self.queue.push_back(Settlement {
                    target: Upstream::Slot(target),
                    source: None,
                    value,
                });
                return Ok(());
            }
        };

        self.mark_pending(target);
        let scope = Scope {
            forest: Arc::clone(&forest),
            node: index,
            documents: documents.into(),
            position: foreign_key.then_some(0),
        };
        let child = self.open_frame(children, Some(scope), value, Upstream::Slot(target))?;
        self.set_child(target, Some(child));
        Ok(())
    }

    fn backend_failure(&mut self, target: SlotAddr, error: StoreError) {
        if !self.frames.contains_key(&target.frame) {
            trace!(
                event = %Event::SnapshotDiscarded,
                invocation = %self.invocation,
                frame = target.frame
            );
            return;
        }
        self.metrics.increment_backend_errors();
        warn!(
            event = %Event::BackendFailure,
            invocation = %self.invocation,
            frame = target.frame,
            code = error.code(),
            error = %error
        );
        match self.mode {
            OperationMode::Query => self.fail(error.into()),
            OperationMode::Subscribe => self.emit(Err(error.into())),
        }
    }

    fn fail(&mut self, err: ResolveError) {
        error!(
            event = %Event::ResolutionFailed,
            invocation = %self.invocation,
            code = err.code(),
            error = %err
        );
        self.emit(Err(err));
        self.shutdown();
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    fn drain(&mut self) {
        while let Some(Settlement {
            target,
            source,
            value,
        }) = self.queue.pop_front()
        {
            match target {
                Upstream::Root => {
                    self.emit(Ok(value));
                    if self.mode == OperationMode::Query {
                        self.shutdown();
                    }
                }
                Upstream::Slot(addr) => self.deliver(addr, source, value),
            }
        }
    }

    fn deliver(&mut self, target: SlotAddr, source: Option<FrameId>, value: Value) {
        let Some(frame) = self.frames.get_mut(&target.frame) else {
            return;
        };
        let Frame {
            forest,
            slots,
            value: out,
            loaded_refs,
            ..
        } = frame;
        let Some(slot) = slots.get_mut(target.slot) else {
            return;
        };
        // Value from a child recursion that has since been replaced
        if source.is_some() && slot.child != source {
            return;
        }
        if slot.state == SlotState::Pending {
            slot.state = SlotState::Settled;
            *loaded_refs += 1;
        }
        place(out, slot.element, slot.item, forest[slot.node].alias(), value);
        self.check_complete(target.frame);
    }

    fn check_complete(&mut self, id: FrameId) {
        let Some(frame) = self.frames.get(&id) else {
            return;
        };
        debug_assert!(frame.loaded_refs <= frame.total_refs);
        if frame.set_up && frame.loaded_refs == frame.total_refs {
            self.queue.push_back(Settlement {
                target: frame.upstream,
                source: Some(id),
                value: frame.value.clone(),
            });
        }
    }

    fn emit(&mut self, emission: Emission) {
        let Some(output) = &self.output else {
            return;
        };
        if emission.is_ok() {
            self.metrics.increment_values_emitted();
            debug!(event = %Event::ValueEmitted, invocation = %self.invocation);
        }
        let _ = output.send(emission);
    }

    // ------------------------------------------------------------------
    // Arena helpers
    // ------------------------------------------------------------------

    fn push_slot(
        &mut self,
        frame: FrameId,
        node: usize,
        element: Option<usize>,
        item: Option<usize>,
    ) -> Option<usize> {
        let frame = self.frames.get_mut(&frame)?;
        frame.slots.push(Slot {
            node,
            element,
            item,
            state: SlotState::Pending,
            child: None,
        });
        frame.total_refs += 1;
        Some(frame.slots.len() - 1)
    }

    fn set_child(&mut self, target: SlotAddr, child: Option<FrameId>) {
        if let Some(slot) = self
            .frames
            .get_mut(&target.frame)
            .and_then(|f| f.slots.get_mut(target.slot))
        {
            slot.child = child;
        }
    }

    fn mark_pending(&mut self, target: SlotAddr) {
        if let Some(frame) = self.frames.get_mut(&target.frame) {
            if let Some(slot) = frame.slots.get_mut(target.slot) {
                if slot.state == SlotState::Settled {
                    slot.state = SlotState::Pending;
                    frame.loaded_refs -= 1;
                }
            }
        }
    }

    fn has_scope(&self, frame: FrameId) -> bool {
        self.frames
            .get(&frame)
            .map(|f| f.scope.is_some())
            .unwrap_or(false)
    }

    /// Removes a frame and everything below it
    fn teardown(&mut self, id: FrameId) {
        let Some(frame) = self.frames.remove(&id) else {
            return;
        };
        for unsubscribe in frame.listeners {
            unsubscribe();
            self.metrics.increment_listeners_detached();
            trace!(
                event = %Event::ListenerDetached,
                invocation = %self.invocation,
                frame = id
            );
        }
        for task in frame.fetches {
            task.abort();
        }
        for child in frame.slots.iter().filter_map(|slot| slot.child) {
            self.teardown(child);
        }
    }
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Writes `value` under `alias` in the record for `element` (or the frame
/// value itself), at position `item` of a foreign-key list when given.
fn place(out: &mut Value, element: Option<usize>, item: Option<usize>, alias: &str, value: Value) {
    let record = match element {
        Some(index) => out.get_mut(index),
        None => Some(out),
    };
    let Some(Value::Object(record)) = record else {
        return;
    };
    match item {
        Some(index) => {
            if let Some(cell) = record.get_mut(alias).and_then(|list| list.get_mut(index)) {
                *cell = value;
            }
        }
        None => {
            record.insert(alias.to_string(), value);
        }
    }
}
