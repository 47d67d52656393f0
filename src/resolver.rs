//! The installation resolver.
//!
//! Walks an ordered candidate list and executes exactly one working
//! installation method, isolating failures so one method's error never
//! blocks evaluation of the next.
//!
//! # Guarantees
//!
//! - Strategies are tried strictly in list order; the first success stops
//!   the walk and later candidates are never touched
//! - Every candidate contributes exactly one recorded outcome; per-strategy
//!   errors are preserved verbatim in the aggregate
//! - A failed action gets its rollback invoked before the walk moves on;
//!   rollback failures are reported and never abort the run
//! - No error escapes `resolve` as an `Err`; the aggregate result is the
//!   sole output
//!
//! Execution is single-threaded and sequential. Strategies may mutate a
//! shared destination path, so the destination is treated as exclusively
//! owned by the resolver for the duration of a run.

use std::time::Instant;

use crate::cancel::CancelToken;
use crate::config::InstallRequest;
use crate::events::{EventSink, ResolverEvent};
use crate::probe::EnvironmentProbe;
use crate::resolution::{
    AttemptStatus, ResolutionPhase, ResolutionResult, ResolutionState, ResolutionStatus,
    StrategyAttempt,
};
use crate::strategy::{InstallStrategy, Precondition};

/// Drives one resolution run.
pub struct Resolver<'a> {
    sink: &'a dyn EventSink,
    cancel: CancelToken,
}

impl<'a> Resolver<'a> {
    /// Resolver without external cancellation.
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            sink,
            cancel: CancelToken::new(),
        }
    }

    /// Resolver observing an externally owned cancellation token.
    pub fn with_cancel(sink: &'a dyn EventSink, cancel: CancelToken) -> Self {
        Self { sink, cancel }
    }

    /// Try candidates in order until one succeeds or the list is exhausted.
    ///
    /// The cancellation token is consulted between attempts only; a strategy
    /// that has started executing runs to completion.
    ///
    /// Callers supply a non-empty list; an empty one yields an `AllFailed`
    /// result with zero attempts rather than a panic.
    pub fn resolve(
        &self,
        mut candidates: Vec<Box<dyn InstallStrategy>>,
        env: &EnvironmentProbe,
        request: &InstallRequest,
    ) -> ResolutionResult {
        let started = Instant::now();
        let total = candidates.len();

        let mut attempts: Vec<StrategyAttempt> = candidates
            .iter()
            .map(|strategy| StrategyAttempt {
                name: strategy.name().to_string(),
                status: AttemptStatus::NotAttempted,
            })
            .collect();

        let mut state = ResolutionState::new();
        let mut chosen = None;
        let mut location = None;
        let mut outcome = None;

        if candidates.is_empty() {
            tracing::warn!("resolve called with an empty candidate list");
        }

        for (index, strategy) in candidates.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                advance(&mut state, ResolutionPhase::Cancelled);
                self.sink.emit(&ResolverEvent::Cancelled {
                    remaining: total - index,
                });
                outcome = Some(ResolutionStatus::Cancelled);
                break;
            }

            advance(&mut state, ResolutionPhase::Evaluating(index));
            let name = attempts[index].name.clone();

            match strategy.precondition(env) {
                Precondition::Unmet(reason) => {
                    tracing::debug!(strategy = %name, reason = %reason, "precondition unmet");
                    self.sink.emit(&ResolverEvent::StrategySkipped {
                        name,
                        reason: reason.clone(),
                    });
                    attempts[index].status = AttemptStatus::Skipped { reason };
                }
                Precondition::Ready => {
                    self.sink.emit(&ResolverEvent::StrategyAttempted {
                        name: name.clone(),
                        index,
                    });

                    match strategy.execute(request, env) {
                        Ok(installed) => {
                            self.sink.emit(&ResolverEvent::StrategySucceeded {
                                name: name.clone(),
                                location: installed.location.clone(),
                            });
                            attempts[index].status = AttemptStatus::Succeeded;
                            advance(&mut state, ResolutionPhase::Done);
                            chosen = Some(name);
                            location = Some(installed.location);
                            outcome = Some(ResolutionStatus::Done);
                            break;
                        }
                        Err(error) => {
                            self.sink.emit(&ResolverEvent::StrategyFailed {
                                name: name.clone(),
                                error: error.clone(),
                            });
                            attempts[index].status = AttemptStatus::Failed { error };

                            advance(&mut state, ResolutionPhase::RollingBack(index));
                            if let Err(rollback_err) = strategy.rollback() {
                                self.sink.emit(&ResolverEvent::RollbackFailed {
                                    name,
                                    reason: rollback_err.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        let status = match outcome {
            Some(status) => status,
            None => {
                // List exhausted without a success
                advance(&mut state, ResolutionPhase::AllFailed);
                let attempted = attempts.iter().filter(|a| a.status.is_failed()).count();
                let skipped = attempts.iter().filter(|a| a.status.is_skipped()).count();
                self.sink
                    .emit(&ResolverEvent::AllFailed { attempted, skipped });
                ResolutionStatus::AllFailed
            }
        };

        debug_assert!(
            attempts.iter().filter(|a| a.status.is_succeeded()).count() <= 1,
            "at most one strategy may succeed per run"
        );

        ResolutionResult {
            status,
            chosen,
            location,
            attempts,
            duration: started.elapsed(),
        }
    }
}

/// Apply a phase transition the walk logic has already decided on.
///
/// The walk only requests transitions the machine permits; a refusal here is
/// a resolver bug, not a runtime condition.
fn advance(state: &mut ResolutionState, to: ResolutionPhase) {
    state
        .advance(to)
        .expect("INTERNAL ERROR: resolver requested an invalid phase transition");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use crate::events::MemorySink;
    use crate::probe::{ElevationLevel, EnvironmentProbe, NetworkState};
    use crate::strategy::InstalledModule;
    use std::path::PathBuf;

    /// Scripted strategy for exercising the walk.
    struct FakeStrategy {
        name: &'static str,
        precondition: Precondition,
        outcome: Option<Result<InstalledModule, InstallError>>,
        rollback_outcome: Result<(), InstallError>,
    }

    impl FakeStrategy {
        fn skipping(name: &'static str, reason: &str) -> Self {
            Self {
                name,
                precondition: Precondition::unmet(reason),
                outcome: None,
                rollback_outcome: Ok(()),
            }
        }

        fn succeeding(name: &'static str) -> Self {
            Self {
                name,
                precondition: Precondition::Ready,
                outcome: Some(Ok(InstalledModule {
                    module: "Foo".to_string(),
                    location: PathBuf::from("/modules/Foo"),
                    freshly_installed: true,
                })),
                rollback_outcome: Ok(()),
            }
        }

        fn failing(name: &'static str, error: InstallError) -> Self {
            Self {
                name,
                precondition: Precondition::Ready,
                outcome: Some(Err(error)),
                rollback_outcome: Ok(()),
            }
        }
    }

    impl InstallStrategy for FakeStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn precondition(&self, _env: &EnvironmentProbe) -> Precondition {
            self.precondition.clone()
        }

        fn execute(
            &mut self,
            _request: &InstallRequest,
            _env: &EnvironmentProbe,
        ) -> Result<InstalledModule, InstallError> {
            self.outcome
                .take()
                .expect("execute called more than once")
        }

        fn rollback(&mut self) -> Result<(), InstallError> {
            self.rollback_outcome.clone()
        }
    }

    fn bare_env() -> EnvironmentProbe {
        EnvironmentProbe {
            clients: vec![],
            module_paths: vec![],
            network: NetworkState::Offline,
            elevation: ElevationLevel::Standard,
        }
    }

    fn request() -> InstallRequest {
        InstallRequest::new("Foo")
    }

    #[test]
    fn test_first_success_stops_the_walk() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let result = resolver.resolve(
            vec![
                Box::new(FakeStrategy::succeeding("first")),
                Box::new(FakeStrategy::succeeding("second")),
            ],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::Done);
        assert_eq!(result.chosen.as_deref(), Some("first"));
        assert_eq!(result.location, Some(PathBuf::from("/modules/Foo")));
        assert!(result.attempts[0].status.is_succeeded());
        assert!(result.attempts[1].status.is_not_attempted());
    }

    #[test]
    fn test_skip_then_fail_then_succeed() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let result = resolver.resolve(
            vec![
                Box::new(FakeStrategy::skipping("a", "client missing")),
                Box::new(FakeStrategy::failing("b", InstallError::network("reset"))),
                Box::new(FakeStrategy::succeeding("c")),
            ],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::Done);
        assert_eq!(result.chosen.as_deref(), Some("c"));
        assert!(result.attempts[0].status.is_skipped());
        assert_eq!(
            result.attempts[1].status,
            AttemptStatus::Failed {
                error: InstallError::network("reset")
            }
        );
        assert!(result.attempts[2].status.is_succeeded());
    }

    #[test]
    fn test_all_failed_preserves_every_error() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let result = resolver.resolve(
            vec![
                Box::new(FakeStrategy::failing("a", InstallError::network("down"))),
                Box::new(FakeStrategy::failing(
                    "b",
                    InstallError::permission("denied"),
                )),
            ],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::AllFailed);
        assert!(result.chosen.is_none());
        let errors = result.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], ("a", &InstallError::network("down")));
        assert_eq!(errors[1], ("b", &InstallError::permission("denied")));
    }

    #[test]
    fn test_all_skipped_executes_nothing() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let result = resolver.resolve(
            vec![
                Box::new(FakeStrategy::skipping("a", "no client")),
                Box::new(FakeStrategy::skipping("b", "offline")),
            ],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::AllFailed);
        assert!(result.attempts.iter().all(|a| a.status.is_skipped()));
        assert!(
            sink.events()
                .iter()
                .all(|e| !matches!(e, ResolverEvent::StrategyAttempted { .. })),
            "no action may run when every precondition is unmet"
        );
    }

    #[test]
    fn test_rollback_runs_only_after_failure() {
        // Every fake's rollback errors, so any rollback invocation surfaces
        // as a RollbackFailed event; only the failing candidate may produce one.
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let mut skipped = FakeStrategy::skipping("skipped", "nope");
        skipped.rollback_outcome = Err(InstallError::unknown("must not run"));
        let mut failing = FakeStrategy::failing("failing", InstallError::unknown("boom"));
        failing.rollback_outcome = Err(InstallError::unknown("cleanup failed"));
        let mut winning = FakeStrategy::succeeding("winning");
        winning.rollback_outcome = Err(InstallError::unknown("must not run"));

        resolver.resolve(
            vec![Box::new(skipped), Box::new(failing), Box::new(winning)],
            &bare_env(),
            &request(),
        );

        let rollback_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ResolverEvent::RollbackFailed { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(rollback_events, vec!["failing".to_string()]);
    }

    #[test]
    fn test_rollback_failure_does_not_abort_the_walk() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let mut failing = FakeStrategy::failing("flaky", InstallError::unknown("boom"));
        failing.rollback_outcome = Err(InstallError::permission("staging dir busy"));

        let result = resolver.resolve(
            vec![Box::new(failing), Box::new(FakeStrategy::succeeding("ok"))],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::Done);
        assert_eq!(result.chosen.as_deref(), Some("ok"));
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, ResolverEvent::RollbackFailed { .. })),
            "rollback failure must be reported"
        );
    }

    #[test]
    fn test_cancelled_before_start() {
        let sink = MemorySink::new();
        let token = CancelToken::new();
        token.cancel();
        let resolver = Resolver::with_cancel(&sink, token);

        let result = resolver.resolve(
            vec![
                Box::new(FakeStrategy::succeeding("a")),
                Box::new(FakeStrategy::succeeding("b")),
            ],
            &bare_env(),
            &request(),
        );

        assert_eq!(result.status, ResolutionStatus::Cancelled);
        assert!(result.attempts.iter().all(|a| a.status.is_not_attempted()));
        assert_eq!(
            sink.events(),
            vec![ResolverEvent::Cancelled { remaining: 2 }]
        );
    }

    #[test]
    fn test_empty_candidate_list_is_all_failed() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        let result = resolver.resolve(vec![], &bare_env(), &request());

        assert_eq!(result.status, ResolutionStatus::AllFailed);
        assert!(result.attempts.is_empty());
    }

    #[test]
    fn test_event_sequence_for_mixed_walk() {
        let sink = MemorySink::new();
        let resolver = Resolver::new(&sink);

        resolver.resolve(
            vec![
                Box::new(FakeStrategy::skipping("a", "no client")),
                Box::new(FakeStrategy::failing("b", InstallError::network("down"))),
                Box::new(FakeStrategy::succeeding("c")),
            ],
            &bare_env(),
            &request(),
        );

        let events = sink.events();
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], ResolverEvent::StrategySkipped { name, .. } if name == "a"));
        assert!(
            matches!(&events[1], ResolverEvent::StrategyAttempted { name, index: 1 } if name == "b")
        );
        assert!(matches!(&events[2], ResolverEvent::StrategyFailed { name, .. } if name == "b"));
        assert!(
            matches!(&events[3], ResolverEvent::StrategyAttempted { name, index: 2 } if name == "c")
        );
        assert!(matches!(&events[4], ResolverEvent::StrategySucceeded { name, .. } if name == "c"));
    }
}
