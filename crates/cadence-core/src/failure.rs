//! Failure classification for ceremony execution.
//!
//! Each ceremony type carries a configured [`FailurePolicy`]. Independent of
//! policy, a circuit breaker counts consecutive failures per (scope, type);
//! at the threshold the type is skipped for that scope from then on. The
//! breaker lives in [`BreakerState`], an explicit value owned by the caller,
//! not ambient global state.

use crate::types::CeremonyType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Retry budget for the `Retry` policy before falling back.
pub const MAX_RETRIES: u32 = 2;

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the surrounding work sequence.
    Abort,
    /// Retry a bounded number of times, then fall back to `Continue`.
    Retry,
    /// Log and proceed.
    Continue,
    /// Disable this ceremony type for this scope going forward.
    SkipFuture,
}

impl FailurePolicy {
    /// Configured policy per ceremony type. Planning is load-bearing, so it
    /// aborts; retrospectives are retried to avoid losing learnings;
    /// standups are best-effort.
    pub fn for_type(ceremony_type: CeremonyType) -> Self {
        match ceremony_type {
            CeremonyType::Planning => FailurePolicy::Abort,
            CeremonyType::Retrospective => FailurePolicy::Retry,
            CeremonyType::Standup => FailurePolicy::Continue,
        }
    }
}

// ---------------------------------------------------------------------------
// FailureAction
// ---------------------------------------------------------------------------

/// Resolved instruction back to the orchestrator after one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    Abort,
    /// Retry with attempts remaining out of the [`MAX_RETRIES`] budget.
    Retry { remaining: u32 },
    Continue,
    SkipFuture,
}

// ---------------------------------------------------------------------------
// BreakerState
// ---------------------------------------------------------------------------

/// Per (scope, type) consecutive-failure counters and the skip set.
///
/// Owned by the work coordinator and injected wherever needed; the trigger
/// engine reads `is_skipped` so a tripped breaker excludes the type from
/// future evaluations.
#[derive(Debug, Default, Clone)]
pub struct BreakerState {
    consecutive: HashMap<(String, CeremonyType), u32>,
    skipped: HashSet<(String, CeremonyType)>,
    /// Skip transitions already reported, so the warning fires once per key.
    announced: HashSet<(String, CeremonyType)>,
}

impl BreakerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self, scope: &str, ceremony_type: CeremonyType) -> u32 {
        self.consecutive
            .get(&(scope.to_string(), ceremony_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_skipped(&self, scope: &str, ceremony_type: CeremonyType) -> bool {
        self.skipped
            .contains(&(scope.to_string(), ceremony_type))
    }

    fn record_failure(&mut self, scope: &str, ceremony_type: CeremonyType) -> u32 {
        let count = self
            .consecutive
            .entry((scope.to_string(), ceremony_type))
            .or_insert(0);
        *count += 1;
        *count
    }

    fn record_success(&mut self, scope: &str, ceremony_type: CeremonyType) {
        self.consecutive.insert((scope.to_string(), ceremony_type), 0);
    }

    fn mark_skipped(&mut self, scope: &str, ceremony_type: CeremonyType) -> bool {
        let key = (scope.to_string(), ceremony_type);
        self.skipped.insert(key.clone());
        self.announced.insert(key)
    }
}

// ---------------------------------------------------------------------------
// FailureHandler
// ---------------------------------------------------------------------------

pub struct FailureHandler {
    threshold: u32,
    state: BreakerState,
}

impl FailureHandler {
    pub fn new(circuit_breaker_threshold: u32, state: BreakerState) -> Self {
        Self {
            threshold: circuit_breaker_threshold,
            state,
        }
    }

    pub fn breaker(&self) -> &BreakerState {
        &self.state
    }

    /// Classify one execution failure into the action the orchestrator takes.
    ///
    /// `attempt` is the 1-indexed attempt that just failed. The breaker is
    /// consulted first: at the threshold it forces `SkipFuture` regardless of
    /// the configured policy.
    pub fn on_failure(
        &mut self,
        scope: &str,
        ceremony_type: CeremonyType,
        attempt: u32,
    ) -> FailureAction {
        let consecutive = self.state.record_failure(scope, ceremony_type);
        if consecutive >= self.threshold {
            let first = self.state.mark_skipped(scope, ceremony_type);
            if first {
                warn!(
                    scope,
                    ceremony_type = %ceremony_type,
                    consecutive,
                    "circuit breaker tripped: skipping this ceremony type for the scope"
                );
            }
            return FailureAction::SkipFuture;
        }

        match FailurePolicy::for_type(ceremony_type) {
            FailurePolicy::Abort => FailureAction::Abort,
            FailurePolicy::Continue => {
                debug!(scope, ceremony_type = %ceremony_type, "ceremony failed, continuing");
                FailureAction::Continue
            }
            FailurePolicy::Retry => {
                if attempt <= MAX_RETRIES {
                    FailureAction::Retry {
                        remaining: MAX_RETRIES - attempt + 1,
                    }
                } else {
                    // Retry budget exhausted: fall back to Continue so the
                    // work sequence survives a lost retrospective.
                    debug!(
                        scope,
                        ceremony_type = %ceremony_type,
                        "retry budget exhausted, continuing without ceremony"
                    );
                    FailureAction::Continue
                }
            }
            FailurePolicy::SkipFuture => {
                self.state.mark_skipped(scope, ceremony_type);
                FailureAction::SkipFuture
            }
        }
    }

    /// Reset the consecutive-failure counter after a successful ceremony.
    pub fn on_success(&mut self, scope: &str, ceremony_type: CeremonyType) {
        self.state.record_success(scope, ceremony_type);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> FailureHandler {
        FailureHandler::new(3, BreakerState::new())
    }

    #[test]
    fn policy_table() {
        assert_eq!(
            FailurePolicy::for_type(CeremonyType::Planning),
            FailurePolicy::Abort
        );
        assert_eq!(
            FailurePolicy::for_type(CeremonyType::Retrospective),
            FailurePolicy::Retry
        );
        assert_eq!(
            FailurePolicy::for_type(CeremonyType::Standup),
            FailurePolicy::Continue
        );
    }

    #[test]
    fn planning_aborts_immediately() {
        let mut h = handler();
        let action = h.on_failure("epic-1", CeremonyType::Planning, 1);
        assert_eq!(action, FailureAction::Abort);
    }

    #[test]
    fn retrospective_retries_then_continues() {
        let mut h = handler();
        // Breaker threshold is 3, so use a fresh scope each attempt to
        // exercise only the policy path.
        assert_eq!(
            h.on_failure("s1", CeremonyType::Retrospective, 1),
            FailureAction::Retry { remaining: 2 }
        );
        assert_eq!(
            h.on_failure("s2", CeremonyType::Retrospective, 2),
            FailureAction::Retry { remaining: 1 }
        );
        assert_eq!(
            h.on_failure("s3", CeremonyType::Retrospective, 3),
            FailureAction::Continue
        );
    }

    #[test]
    fn breaker_trips_at_threshold() {
        let mut h = handler();
        assert_eq!(
            h.on_failure("epic-9", CeremonyType::Standup, 1),
            FailureAction::Continue
        );
        assert_eq!(
            h.on_failure("epic-9", CeremonyType::Standup, 1),
            FailureAction::Continue
        );
        assert_eq!(
            h.on_failure("epic-9", CeremonyType::Standup, 1),
            FailureAction::SkipFuture
        );
        assert!(h.breaker().is_skipped("epic-9", CeremonyType::Standup));
    }

    #[test]
    fn breaker_overrides_abort_policy() {
        let mut h = FailureHandler::new(1, BreakerState::new());
        // Threshold 1: even planning's Abort policy is preempted.
        assert_eq!(
            h.on_failure("epic-1", CeremonyType::Planning, 1),
            FailureAction::SkipFuture
        );
    }

    #[test]
    fn success_resets_counter() {
        let mut h = handler();
        h.on_failure("epic-1", CeremonyType::Standup, 1);
        h.on_failure("epic-1", CeremonyType::Standup, 1);
        h.on_success("epic-1", CeremonyType::Standup);
        assert_eq!(
            h.breaker().consecutive_failures("epic-1", CeremonyType::Standup),
            0
        );
        // Two more failures should not trip the threshold of 3.
        h.on_failure("epic-1", CeremonyType::Standup, 1);
        assert_eq!(
            h.on_failure("epic-1", CeremonyType::Standup, 1),
            FailureAction::Continue
        );
    }

    #[test]
    fn breaker_is_per_scope_and_type() {
        let mut h = handler();
        for _ in 0..3 {
            h.on_failure("epic-9", CeremonyType::Standup, 1);
        }
        assert!(h.breaker().is_skipped("epic-9", CeremonyType::Standup));
        assert!(!h.breaker().is_skipped("epic-8", CeremonyType::Standup));
        assert!(!h.breaker().is_skipped("epic-9", CeremonyType::Planning));
    }
}
