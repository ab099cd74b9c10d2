//! Trigger evaluation: which ceremony types should fire for a scope right now.
//!
//! `evaluate` is a pure function over the supplied context and state objects.
//! Per-(scope, type) counts and last-fired timestamps live in an explicit
//! [`TriggerState`] owned by the work coordinator, never in process globals.
//! Safety-gate violations are not errors: the type is silently excluded and
//! the exclusion logged at low severity.

use crate::config::CadenceConfig;
use crate::failure::BreakerState;
use crate::types::{CeremonyType, LearningCategory, ScaleLevel};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// TriggerContext
// ---------------------------------------------------------------------------

/// Snapshot of a scope's progress at one evaluation moment. Rebuilt by the
/// work coordinator after every step report; never persisted.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub scope: String,
    pub scale: ScaleLevel,
    pub steps_completed: u32,
    pub steps_total: u32,
    pub quality_gate_passed: bool,
    /// Consecutive failed work steps reported by the executor.
    pub consecutive_failures: u32,
    pub work_category: Option<LearningCategory>,
}

// ---------------------------------------------------------------------------
// TriggerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TriggerEntry {
    count: u32,
    last_fired: Option<DateTime<Utc>>,
}

/// Ceremony history per (scope, type): how many have been held and when the
/// most recent one fired.
#[derive(Debug, Clone, Default)]
pub struct TriggerState {
    entries: HashMap<(String, CeremonyType), TriggerEntry>,
}

impl TriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, scope: &str, ceremony_type: CeremonyType) -> u32 {
        self.entries
            .get(&(scope.to_string(), ceremony_type))
            .map(|e| e.count)
            .unwrap_or(0)
    }

    pub fn last_fired(&self, scope: &str, ceremony_type: CeremonyType) -> Option<DateTime<Utc>> {
        self.entries
            .get(&(scope.to_string(), ceremony_type))
            .and_then(|e| e.last_fired)
    }

    /// Record a committed ceremony. Called after the atomic commit succeeds,
    /// so an aborted ceremony never consumes the scope's budget.
    pub fn record_fired(&mut self, scope: &str, ceremony_type: CeremonyType, at: DateTime<Utc>) {
        let entry = self
            .entries
            .entry((scope.to_string(), ceremony_type))
            .or_default();
        entry.count += 1;
        entry.last_fired = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Rule helpers
// ---------------------------------------------------------------------------

/// Standup step interval by scale: small scopes check in more often.
fn standup_interval(scale: ScaleLevel) -> u32 {
    match scale {
        ScaleLevel::Small | ScaleLevel::Medium => 3,
        ScaleLevel::Large | ScaleLevel::Epic => 5,
    }
}

fn planning_due(ctx: &TriggerContext, state: &TriggerState) -> bool {
    // Required once per scope at or above the Medium threshold.
    ctx.scale >= ScaleLevel::Medium && state.count(&ctx.scope, CeremonyType::Planning) == 0
}

fn standup_due(ctx: &TriggerContext) -> bool {
    // A failed quality gate or a failure streak overrides the interval.
    if !ctx.quality_gate_passed || ctx.consecutive_failures >= 2 {
        return true;
    }
    let interval = standup_interval(ctx.scale);
    ctx.steps_completed > 0 && ctx.steps_completed % interval == 0
}

fn retrospective_due(ctx: &TriggerContext) -> bool {
    if ctx.steps_total == 0 {
        return false;
    }
    // Required at completion; optional mid-scope checkpoint for larger scopes.
    if ctx.steps_completed >= ctx.steps_total {
        return true;
    }
    ctx.scale >= ScaleLevel::Large && ctx.steps_completed * 2 >= ctx.steps_total
}

// ---------------------------------------------------------------------------
// TriggerEngine
// ---------------------------------------------------------------------------

pub struct TriggerEngine {
    max_per_scope: u32,
    cooldowns: crate::config::CooldownHours,
}

impl TriggerEngine {
    pub fn new(config: &CadenceConfig) -> Self {
        Self {
            max_per_scope: config.max_ceremonies_per_scope,
            cooldowns: config.cooldown_hours.clone(),
        }
    }

    /// Decide which ceremony types should fire, in the fixed order planning,
    /// standup, retrospective. Both safety gates (limit, then cooldown) must
    /// pass, and a tripped circuit breaker excludes the type outright.
    pub fn evaluate(
        &self,
        ctx: &TriggerContext,
        state: &TriggerState,
        breaker: &BreakerState,
        now: DateTime<Utc>,
    ) -> Vec<CeremonyType> {
        let mut fired = Vec::new();
        for &ceremony_type in CeremonyType::all() {
            let due = match ceremony_type {
                CeremonyType::Planning => planning_due(ctx, state),
                CeremonyType::Standup => standup_due(ctx),
                CeremonyType::Retrospective => retrospective_due(ctx),
            };
            if !due {
                continue;
            }
            if breaker.is_skipped(&ctx.scope, ceremony_type) {
                debug!(scope = %ctx.scope, %ceremony_type, "excluded: circuit breaker skip");
                continue;
            }
            if !self.limit_gate(ctx, state, ceremony_type) {
                continue;
            }
            if !self.cooldown_gate(ctx, state, ceremony_type, now) {
                continue;
            }
            fired.push(ceremony_type);
        }
        fired
    }

    fn limit_gate(
        &self,
        ctx: &TriggerContext,
        state: &TriggerState,
        ceremony_type: CeremonyType,
    ) -> bool {
        let count = state.count(&ctx.scope, ceremony_type);
        if count >= self.max_per_scope {
            debug!(
                scope = %ctx.scope,
                %ceremony_type,
                count,
                max = self.max_per_scope,
                "excluded: ceremony limit reached"
            );
            return false;
        }
        true
    }

    fn cooldown_gate(
        &self,
        ctx: &TriggerContext,
        state: &TriggerState,
        ceremony_type: CeremonyType,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last) = state.last_fired(&ctx.scope, ceremony_type) else {
            return true;
        };
        let cooldown = Duration::hours(self.cooldowns.for_type(ceremony_type) as i64);
        if now - last < cooldown {
            debug!(
                scope = %ctx.scope,
                %ceremony_type,
                elapsed_hours = (now - last).num_hours(),
                "excluded: cooldown not elapsed"
            );
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
