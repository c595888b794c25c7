//! # Invocation Facade
//!
//! Entry point for running a query forest against a store. Each invocation
//! gets its own reference cache and frame arena, a pump task applying
//! backend traffic, and in live mode a [`Coalescer`] between the resolver
//! and the caller.
//!
//! All `execute` variants must be called from within a tokio runtime.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::coalescer::Coalescer;
use super::config::ResolverConfig;
use super::engine::{Emission, Inbound, OperationMode, Progress, Resolver};
use super::errors::{ResolveError, ResolveResult};
use super::normalize::Normalizer;
use crate::observability::ResolverMetrics;
use crate::plan::Forest;
use crate::store::DocumentStore;

/// Runs query forests against one store
pub struct Executor {
    store: Arc<dyn DocumentStore>,
    config: ResolverConfig,
    metrics: Arc<ResolverMetrics>,
}

impl Executor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: ResolverConfig::default(),
            metrics: Arc::new(ResolverMetrics::new()),
        }
    }

    /// Replaces the configuration after validating it
    pub fn with_config(mut self, config: ResolverConfig) -> ResolveResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Shares a metrics registry with other executors
    pub fn with_metrics(mut self, metrics: Arc<ResolverMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ResolverMetrics> {
        &self.metrics
    }

    /// Starts resolving `forest`.
    ///
    /// `initial` is the parent value the root nodes read their fields from
    /// (an empty object when absent). Structural errors found while
    /// walking the forest are returned here; everything after setup is
    /// delivered through the returned [`Invocation`].
    pub fn execute(
        &self,
        forest: &Forest,
        initial: Option<Value>,
        mode: OperationMode,
    ) -> ResolveResult<Invocation> {
        let id = Uuid::new_v4();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (emit_tx, emit_rx) = mpsc::unbounded_channel();

        let mut resolver = Resolver::new(
            id,
            Arc::clone(&self.store),
            mode,
            Normalizer::new(&self.config),
            Arc::clone(&self.metrics),
            inbox_tx,
            emit_tx,
        );
        resolver.start(
            Arc::clone(forest),
            initial.unwrap_or_else(|| Value::Object(Map::new())),
        )?;

        let (updates, coalescer) = match mode {
            OperationMode::Query => (emit_rx, None),
            OperationMode::Subscribe => {
                let (tx, rx) = mpsc::unbounded_channel();
                let coalescer = Coalescer::new(self.config.coalesce_window());
                let task = tokio::spawn(coalescer.run(emit_rx, tx, ResolveError::is_fatal));
                (rx, Some(task.abort_handle()))
            }
        };

        let resolver = Arc::new(Mutex::new(resolver));
        let pump = tokio::spawn(pump(Arc::clone(&resolver), inbox_rx)).abort_handle();

        Ok(Invocation {
            id,
            updates,
            handle: CleanupHandle {
                resolver,
                pump,
                coalescer,
            },
        })
    }

    /// Resolves `forest` once and returns the settled value.
    ///
    /// Setup and backend errors are returned as they are. If the invocation
    /// shuts down before it produces any value, the result is
    /// [`ResolveError::Closed`]. A store that never answers a fetch keeps
    /// this future pending; it does not turn into `Closed`.
    pub async fn query(&self, forest: &Forest) -> ResolveResult<Value> {
        first_value(self.execute(forest, None, OperationMode::Query)?).await
    }

    /// Resolves `forest` live; every coalesced change arrives on the
    /// returned invocation until it is cleaned up or dropped
    pub fn subscribe(&self, forest: &Forest) -> ResolveResult<Invocation> {
        self.execute(forest, None, OperationMode::Subscribe)
    }
}

/// Takes the first item of a one-shot invocation, then cleans it up
async fn first_value(mut invocation: Invocation) -> ResolveResult<Value> {
    let result = invocation.next().await.unwrap_or(Err(ResolveError::Closed));
    invocation.cleanup();
    result
}

/// Applies backend traffic until the resolver closes
async fn pump(resolver: Arc<Mutex<Resolver>>, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
    if lock(&resolver).is_closed() {
        return;
    }
    while let Some(message) = inbox.recv().await {
        let mut resolver = lock(&resolver);
        resolver.handle(message);
        if resolver.is_closed() {
            break;
        }
    }
}

fn lock(resolver: &Mutex<Resolver>) -> MutexGuard<'_, Resolver> {
    resolver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancels an invocation. Cloneable and idempotent.
#[derive(Clone)]
pub struct CleanupHandle {
    resolver: Arc<Mutex<Resolver>>,
    pump: AbortHandle,
    coalescer: Option<AbortHandle>,
}

impl CleanupHandle {
    /// Detaches every listener and stops further emissions. A no-op once
    /// the invocation has finished.
    pub fn cleanup(&self) {
        lock(&self.resolver).shutdown();
        self.pump.abort();
        if let Some(coalescer) = &self.coalescer {
            coalescer.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.resolver).is_closed()
    }
}

impl std::fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A running resolution.
///
/// Yields settled values (and errors) in order. A one-shot invocation
/// yields one item and ends; a live one keeps yielding until cleanup.
/// Dropping the invocation cleans it up.
#[derive(Debug)]
pub struct Invocation {
    id: Uuid,
    updates: mpsc::UnboundedReceiver<Emission>,
    handle: CleanupHandle,
}

impl Invocation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next value. `None` once the invocation has ended.
    pub async fn next(&mut self) -> Option<ResolveResult<Value>> {
        self.updates.recv().await
    }

    /// Returns a value that is already available without waiting
    pub fn try_next(&mut self) -> Option<ResolveResult<Value>> {
        self.updates.try_recv().ok()
    }

    /// Handle that cancels this invocation from elsewhere
    pub fn handle(&self) -> CleanupHandle {
        self.handle.clone()
    }

    pub fn cleanup(&self) {
        self.handle.cleanup();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Reference counters of the root, `None` once torn down
    pub fn progress(&self) -> Option<Progress> {
        lock(&self.handle.resolver).progress()
    }
}

impl Stream for Invocation {
    type Item = ResolveResult<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().updates.poll_recv(cx)
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        self.handle.cleanup();
    }
}
