//! Observable resolver events
//!
//! Every log line the resolver writes carries one of these as its `event`
//! field. Events are explicit and typed.

use std::fmt;

/// Observable events in the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Invocation lifecycle
    /// Resolution of a forest begins
    InvocationStart,
    /// Invocation torn down (cleanup or natural completion)
    InvocationStop,

    // Backend traffic
    /// One-shot read issued
    FetchIssued,
    /// Listener attached to a reference
    ListenerAttached,
    /// Listener detached
    ListenerDetached,
    /// Reference served from the invocation cache
    ReferenceReused,
    /// Snapshot arrived for a frame that no longer exists
    SnapshotDiscarded,

    // Results
    /// Fully settled value emitted to the caller
    ValueEmitted,

    // Failures
    /// Backend reported a fetch or listener failure
    BackendFailure,
    /// Structural failure aborted the invocation (FATAL)
    ResolutionFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::InvocationStart => "INVOCATION_START",
            Event::InvocationStop => "INVOCATION_STOP",
            Event::FetchIssued => "FETCH_ISSUED",
            Event::ListenerAttached => "LISTENER_ATTACHED",
            Event::ListenerDetached => "LISTENER_DETACHED",
            Event::ReferenceReused => "REFERENCE_REUSED",
            Event::SnapshotDiscarded => "SNAPSHOT_DISCARDED",
            Event::ValueEmitted => "VALUE_EMITTED",
            Event::BackendFailure => "BACKEND_FAILURE",
            Event::ResolutionFailed => "RESOLUTION_FAILED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ResolutionFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
