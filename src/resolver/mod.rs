//! # Resolver
//!
//! Resolves a query forest against a [`DocumentStore`](crate::store::DocumentStore)
//! and composes one output tree.
//!
//! ## Architecture
//!
//! - **Reference Cache**: one backend reference per node and scope
//! - **Normalizer**: snapshot to output record (`id`, type tag)
//! - **Engine**: frame arena with per-frame `total_refs`/`loaded_refs`;
//!   a frame settles upward only when all of its references have loaded
//! - **Coalescer**: trailing-edge throttle on live emissions
//! - **Invocation**: one-shot and live entry points with idempotent cleanup

mod cache;
mod coalescer;
pub mod config;
mod engine;
pub mod errors;
mod invocation;
mod normalize;

pub use cache::ReferenceCache;
pub use coalescer::Coalescer;
pub use config::ResolverConfig;
pub use engine::{OperationMode, Progress};
pub use errors::{ResolveError, ResolveResult, Severity};
pub use invocation::{CleanupHandle, Executor, Invocation};
pub use normalize::{Normalizer, ID_FIELD};
