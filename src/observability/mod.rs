//! Observability for the resolver
//!
//! - Typed lifecycle events, written through `tracing` as the `event` field
//! - Counter metrics shared across invocations
//!
//! The library never installs a `tracing` subscriber; that is up to the
//! embedding application.

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{MetricsSnapshot, ResolverMetrics};
