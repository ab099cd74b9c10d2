//! Learning and learning-application records, plus the statistics recompute
//! that runs after every recorded application.

use crate::types::{ApplicationOutcome, LearningCategory, ScaleLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence is capped below 1.0: no learning is ever treated as certain.
pub const CONFIDENCE_CAP: f64 = 0.95;

// ---------------------------------------------------------------------------
// Learning
// ---------------------------------------------------------------------------

/// A distilled insight extracted from a ceremony.
///
/// Created at ceremony commit time; statistics are mutated only by
/// `record_application`, decay and deactivation only by the maintenance job.
/// Logically deleted by clearing `active`, never physically removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: Uuid,
    pub topic: String,
    pub category: LearningCategory,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Author-assigned baseline relevance in [0,1].
    pub relevance_score: f64,
    /// Scale the originating scope ran at, when known. Feeds scale-adjacency
    /// scoring; `None` scores as neutral adjacency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleLevel>,
    #[serde(default)]
    pub application_count: u32,
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default = "default_decay")]
    pub decay_factor: f64,
    pub indexed_at: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
}

fn default_success_rate() -> f64 {
    0.5
}

fn default_confidence() -> f64 {
    0.5
}

fn default_decay() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

impl Learning {
    pub fn new(
        topic: impl Into<String>,
        category: LearningCategory,
        content: impl Into<String>,
        tags: Vec<String>,
        relevance_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            category,
            content: content.into(),
            tags,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            scale: None,
            application_count: 0,
            success_rate: default_success_rate(),
            confidence_score: default_confidence(),
            decay_factor: default_decay(),
            indexed_at: Utc::now(),
            active: true,
            superseded_by: None,
        }
    }

    /// Age in whole-plus-fractional days at `now`. Never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.indexed_at).num_seconds().max(0) as f64;
        secs / 86_400.0
    }

    /// Recompute `success_rate` and `confidence_score` from the full
    /// application history.
    ///
    /// `success_rate = (successes + 0.5*partials) / count`.
    /// `confidence = min(0.95, 0.5 + 0.45*sqrt(successes/count))`, scaled by
    /// `success_rate*2` when the rate drops below 0.5. Grows smoothly with
    /// evidence; a learning is never penalized purely for few applications,
    /// and a recorded success can never lower confidence.
    pub fn recompute_stats(&mut self, outcomes: &[ApplicationOutcome]) {
        let count = outcomes.len();
        if count == 0 {
            self.application_count = 0;
            self.success_rate = default_success_rate();
            self.confidence_score = default_confidence();
            return;
        }
        let successes = outcomes
            .iter()
            .filter(|o| matches!(o, ApplicationOutcome::Success))
            .count();
        let partials = outcomes
            .iter()
            .filter(|o| matches!(o, ApplicationOutcome::Partial))
            .count();

        let n = count as f64;
        let success_rate = (successes as f64 + 0.5 * partials as f64) / n;
        let mut confidence = (0.5 + 0.45 * (successes as f64 / n).sqrt()).min(CONFIDENCE_CAP);
        if success_rate < 0.5 {
            confidence *= success_rate * 2.0;
        }

        self.application_count = count as u32;
        self.success_rate = success_rate;
        self.confidence_score = confidence.clamp(0.0, 1.0);
    }
}

// ---------------------------------------------------------------------------
// LearningApplication
// ---------------------------------------------------------------------------

/// Append-only audit row: one recorded use of a learning in a scope.
/// Never mutated or deleted except by time-based pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningApplication {
    pub id: Uuid,
    pub learning_id: Uuid,
    pub scope: String,
    pub outcome: ApplicationOutcome,
    pub context: String,
    pub applied_at: DateTime<Utc>,
}

impl LearningApplication {
    pub fn new(
        learning_id: Uuid,
        scope: impl Into<String>,
        outcome: ApplicationOutcome,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            learning_id,
            scope: scope.into(),
            outcome,
            context: context.into(),
            applied_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationOutcome::{Failure, Partial, Success};

    fn learning() -> Learning {
        Learning::new(
            "flaky integration tests",
            LearningCategory::Quality,
            "Quarantine flaky tests before they block the gate",
            vec!["ci".to_string(), "tests".to_string()],
            0.8,
        )
    }

    #[test]
    fn new_learning_defaults() {
        let l = learning();
        assert!(l.active);
        assert_eq!(l.application_count, 0);
        assert_eq!(l.success_rate, 0.5);
        assert_eq!(l.confidence_score, 0.5);
        assert_eq!(l.decay_factor, 1.0);
        assert!(l.superseded_by.is_none());
    }

    #[test]
    fn relevance_clamped() {
        let l = Learning::new("t", LearningCategory::Process, "c", vec![], 1.7);
        assert_eq!(l.relevance_score, 1.0);
    }

    #[test]
    fn stats_nine_success_one_partial() {
        // 9 successes + 1 partial: rate 0.95, confidence ≈ 0.927, no penalty.
        let mut l = learning();
        let mut outcomes = vec![Success; 9];
        outcomes.push(Partial);
        l.recompute_stats(&outcomes);
        assert!((l.success_rate - 0.95).abs() < 1e-9);
        let expected = 0.5 + 0.45 * (9.0f64 / 10.0).sqrt();
        assert!((l.confidence_score - expected).abs() < 1e-9);
        assert!((l.confidence_score - 0.927).abs() < 0.001);
        assert_eq!(l.application_count, 10);
    }

    #[test]
    fn confidence_capped_at_095() {
        let mut l = learning();
        l.recompute_stats(&vec![Success; 50]);
        assert_eq!(l.confidence_score, CONFIDENCE_CAP);
        assert_eq!(l.success_rate, 1.0);
    }

    #[test]
    fn low_success_rate_scales_confidence_down() {
        let mut l = learning();
        l.recompute_stats(&[Success, Failure, Failure, Failure]);
        // rate = 0.25 < 0.5 → confidence scaled by 0.5
        assert!((l.success_rate - 0.25).abs() < 1e-9);
        let base = 0.5 + 0.45 * (0.25f64).sqrt();
        assert!((l.confidence_score - base * 0.5).abs() < 1e-9);
    }

    #[test]
    fn success_never_decreases_confidence() {
        let mut l = learning();
        let mut outcomes = vec![Success, Failure, Partial];
        l.recompute_stats(&outcomes);
        let mut prev = l.confidence_score;
        for _ in 0..20 {
            outcomes.push(Success);
            l.recompute_stats(&outcomes);
            assert!(l.confidence_score >= prev - 1e-12);
            prev = l.confidence_score;
        }
    }

    #[test]
    fn empty_history_resets_to_defaults() {
        let mut l = learning();
        l.recompute_stats(&[Success]);
        l.recompute_stats(&[]);
        assert_eq!(l.application_count, 0);
        assert_eq!(l.success_rate, 0.5);
        assert_eq!(l.confidence_score, 0.5);
    }

    #[test]
    fn age_days_never_negative() {
        let l = learning();
        let past = l.indexed_at - chrono::Duration::hours(5);
        assert_eq!(l.age_days(past), 0.0);
        let later = l.indexed_at + chrono::Duration::days(3);
        assert!((l.age_days(later) - 3.0).abs() < 1e-6);
    }
}
