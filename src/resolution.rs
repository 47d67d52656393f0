//! Resolution state machine and result types.
//!
//! The resolver walks candidates under a validated state machine so that
//! illegal orderings (acting after a terminal state, jumping over a
//! candidate, rolling back something that never ran) are programming errors
//! caught at the transition, not silent misbehavior.
//!
//! # Phase Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Evaluating(i)
//!     ├─ precondition unmet ──→ Evaluating(i+1)
//!     ├─ action failed ───────→ RollingBack(i) ──→ Evaluating(i+1)
//!     └─ action succeeded ────→ Done
//!
//! Terminals: Done (one success), AllFailed (list exhausted),
//! Cancelled (token observed between attempts)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::error::InstallError;

// ============================================================================
// Phases
// ============================================================================

/// Where a resolution run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    /// No candidate has been looked at yet
    NotStarted,
    /// Candidate `i` is being evaluated (precondition or action)
    Evaluating(usize),
    /// Candidate `i` failed and its cleanup is running
    RollingBack(usize),
    /// A candidate succeeded (terminal)
    Done,
    /// Every candidate was skipped or failed (terminal)
    AllFailed,
    /// Cancellation observed between attempts (terminal)
    Cancelled,
}

impl ResolutionPhase {
    /// Returns true for the three terminal phases.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::AllFailed | Self::Cancelled)
    }
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Evaluating(i) => write!(f, "evaluating({})", i),
            Self::RollingBack(i) => write!(f, "rolling-back({})", i),
            Self::Done => write!(f, "done"),
            Self::AllFailed => write!(f, "all-failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors for phase transitions the machine refuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    Invalid {
        from: ResolutionPhase,
        to: ResolutionPhase,
    },
}

/// Owns the current phase and validates every transition.
#[derive(Debug, Clone)]
pub struct ResolutionState {
    phase: ResolutionPhase,
}

impl Default for ResolutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionState {
    /// Create a state machine in the `NotStarted` phase.
    pub fn new() -> Self {
        Self {
            phase: ResolutionPhase::NotStarted,
        }
    }

    /// Returns the current phase
    #[inline]
    pub fn phase(&self) -> ResolutionPhase {
        self.phase
    }

    /// Move to `to`, refusing anything the phase flow does not allow.
    pub fn advance(&mut self, to: ResolutionPhase) -> Result<(), TransitionError> {
        if Self::permitted(self.phase, to) {
            self.phase = to;
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                from: self.phase,
                to,
            })
        }
    }

    fn permitted(from: ResolutionPhase, to: ResolutionPhase) -> bool {
        use ResolutionPhase::*;
        match (from, to) {
            // First candidate, or terminal outcomes of a run that never got
            // to evaluate anything (empty list, immediate cancellation)
            (NotStarted, Evaluating(0)) => true,
            (NotStarted, AllFailed | Cancelled) => true,

            // Skip moves straight to the next candidate
            (Evaluating(i), Evaluating(j)) => j == i + 1,
            // A failed action rolls back the same candidate, never another
            (Evaluating(i), RollingBack(j)) => i == j,
            (Evaluating(_), Done) => true,
            (Evaluating(_), AllFailed | Cancelled) => true,

            // After rollback the walk resumes at the next candidate
            (RollingBack(i), Evaluating(j)) => j == i + 1,
            (RollingBack(_), AllFailed | Cancelled) => true,

            _ => false,
        }
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

/// Recorded outcome of one candidate strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    /// A prior candidate succeeded (or the run was cancelled) first
    NotAttempted,
    /// The precondition did not hold; the action never ran
    Skipped { reason: String },
    /// The action ran and failed
    Failed { error: InstallError },
    /// The action ran and the module is installed
    Succeeded,
}

impl AttemptStatus {
    pub const fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub const fn is_not_attempted(&self) -> bool {
        matches!(self, Self::NotAttempted)
    }

    /// Short label for rendering tables and log lines.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not attempted",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
            Self::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { reason } => write!(f, "skipped ({})", reason),
            Self::Failed { error } => write!(f, "failed ({})", error),
            _ => write!(f, "{}", self.label()),
        }
    }
}

/// One candidate's entry in the aggregate result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub name: String,
    #[serde(flatten)]
    pub status: AttemptStatus,
}

// ============================================================================
// Aggregate Result
// ============================================================================

/// Terminal status of a resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStatus {
    /// Exactly one strategy succeeded
    Done,
    /// Every strategy was skipped or failed
    AllFailed,
    /// The run was cancelled before completing
    Cancelled,
}

impl ResolutionStatus {
    /// Returns true if the module ended up installed.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// The sole output of a resolution run.
///
/// Carries one entry per candidate, in candidate order, so no per-strategy
/// error is ever dropped from the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    /// Name of the strategy that succeeded, when one did
    pub chosen: Option<String>,
    /// Where the module was installed, when resolution succeeded
    pub location: Option<PathBuf>,
    /// One recorded outcome per candidate, in candidate order
    pub attempts: Vec<StrategyAttempt>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl ResolutionResult {
    /// Every recorded per-strategy error, in candidate order.
    pub fn errors(&self) -> Vec<(&str, &InstallError)> {
        self.attempts
            .iter()
            .filter_map(|attempt| match &attempt.status {
                AttemptStatus::Failed { error } => Some((attempt.name.as_str(), error)),
                _ => None,
            })
            .collect()
    }

    /// Look up a recorded attempt by strategy name.
    pub fn attempt(&self, name: &str) -> Option<&StrategyAttempt> {
        self.attempts.iter().find(|a| a.name == name)
    }

    /// Returns true if the module ended up installed.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.chosen) {
            (ResolutionStatus::Done, Some(name)) => {
                write!(f, "installed via {} in {:.1?}", name, self.duration)
            }
            (status, _) => write!(f, "{} after {:.1?}", status, self.duration),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
