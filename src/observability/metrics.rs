//! Resolver metrics registry
//!
//! - Counters only, monotonic
//! - Shared across invocations through an `Arc`
//! - Thread-safe, relaxed ordering

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the resolver
#[derive(Debug, Default)]
pub struct ResolverMetrics {
    /// Invocations started (query or subscribe)
    invocations: AtomicU64,
    /// One-shot reads issued to the store
    fetches: AtomicU64,
    /// Listeners attached
    listeners_attached: AtomicU64,
    /// Listeners detached
    listeners_detached: AtomicU64,
    /// Reference cache hits
    cache_hits: AtomicU64,
    /// Reference cache misses (new references built)
    cache_misses: AtomicU64,
    /// Settled values delivered to callers
    values_emitted: AtomicU64,
    /// Backend failures observed
    backend_errors: AtomicU64,
}

impl ResolverMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_invocations(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetches(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listeners_attached(&self) {
        self.listeners_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listeners_detached(&self) {
        self.listeners_detached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_values_emitted(&self) {
        self.values_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_backend_errors(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Listeners attached and not yet detached
    pub fn active_listeners(&self) -> u64 {
        let attached = self.listeners_attached.load(Ordering::Relaxed);
        let detached = self.listeners_detached.load(Ordering::Relaxed);
        attached.saturating_sub(detached)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            listeners_attached: self.listeners_attached.load(Ordering::Relaxed),
            listeners_detached: self.listeners_detached.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            values_emitted: self.values_emitted.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub invocations: u64,
    pub fetches: u64,
    pub listeners_attached: u64,
    pub listeners_detached: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub values_emitted: u64,
    pub backend_errors: u64,
}
