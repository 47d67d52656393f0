//! Structured resolution events and the sink they are delivered to.
//!
//! The resolver reports progress exclusively through [`EventSink`]; it never
//! formats console output itself. The CLI installs a [`TracingSink`], tests
//! install a [`MemorySink`] and assert on the captured sequence.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::InstallError;

/// One observable step of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// A strategy's precondition held and its action is about to run
    StrategyAttempted { name: String, index: usize },
    /// A strategy's precondition did not hold; its action never ran
    StrategySkipped { name: String, reason: String },
    /// A strategy's action completed and the module is in place
    StrategySucceeded { name: String, location: PathBuf },
    /// A strategy's action ran and failed
    StrategyFailed { name: String, error: InstallError },
    /// Cleanup after a failed action itself failed; resolution continues
    RollbackFailed { name: String, reason: String },
    /// Every candidate was skipped or failed
    AllFailed { attempted: usize, skipped: usize },
    /// Cancellation was observed between attempts
    Cancelled { remaining: usize },
}

/// Receiver for resolution events.
///
/// Implementations must not panic; the resolver treats emission as
/// infallible.
pub trait EventSink {
    fn emit(&self, event: &ResolverEvent);
}

/// Sink that forwards events to `tracing` log records.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ResolverEvent) {
        match event {
            ResolverEvent::StrategyAttempted { name, index } => {
                tracing::info!(strategy = %name, index, "attempting installation strategy");
            }
            ResolverEvent::StrategySkipped { name, reason } => {
                tracing::info!(strategy = %name, reason = %reason, "strategy skipped");
            }
            ResolverEvent::StrategySucceeded { name, location } => {
                tracing::info!(strategy = %name, location = %location.display(), "strategy succeeded");
            }
            ResolverEvent::StrategyFailed { name, error } => {
                tracing::warn!(strategy = %name, kind = error.kind(), error = %error, "strategy failed");
            }
            ResolverEvent::RollbackFailed { name, reason } => {
                tracing::warn!(strategy = %name, reason = %reason, "rollback failed");
            }
            ResolverEvent::AllFailed { attempted, skipped } => {
                tracing::error!(attempted, skipped, "all installation strategies exhausted");
            }
            ResolverEvent::Cancelled { remaining } => {
                tracing::warn!(remaining, "resolution cancelled");
            }
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ResolverEvent) {}
}

/// Sink that records events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ResolverEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events captured so far, in emission order.
    pub fn events(&self) -> Vec<ResolverEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ResolverEvent) {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push(event.clone());
    }
}
