//! docresolve - resolves tree-shaped query plans against a hierarchical
//! document database
//!
//! A plan is a forest of [`QueryNode`]s. Resolving it fetches (or listens
//! to) every collection, subcollection and foreign-key reference it names
//! and emits a single composed JSON value once every reference has
//! loaded; in live mode it emits again, coalesced, after every change.

pub mod observability;
pub mod plan;
pub mod resolver;
pub mod store;

pub use plan::{forest, Forest, QueryNode};
pub use resolver::{Executor, Invocation, OperationMode, ResolveError, ResolveResult, ResolverConfig};
pub use store::{DocumentStore, MemoryStore};
