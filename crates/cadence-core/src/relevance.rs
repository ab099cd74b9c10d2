//! Relevance scoring and application recording for stored learnings.
//!
//! The score is an additive weighted sum, deliberately not multiplicative:
//! one weak factor dampens but never zeroes an otherwise-strong learning.
//!
//! ```text
//! score = 0.30*base + 0.20*success_rate + 0.20*confidence
//!       + 0.15*decay(age) + 0.15*context_similarity
//! ```
//!
//! All five factors lie in [0,1], so the score does too. Decay is floored at
//! 0.5 so age alone can never push a learning below half its time credit.

use crate::config::CadenceConfig;
use crate::error::Result;
use crate::learning::{Learning, LearningApplication};
use crate::paths;
use crate::store::CeremonyStore;
use crate::types::{ApplicationOutcome, LearningCategory, ScaleLevel};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Candidate pool size for one query.
const CANDIDATE_LIMIT: usize = 50;

/// Default number of results returned by a query.
pub const DEFAULT_LIMIT: usize = 5;

// Weights of the additive score. Must sum to 1.
const W_BASE: f64 = 0.30;
const W_SUCCESS: f64 = 0.20;
const W_CONFIDENCE: f64 = 0.20;
const W_DECAY: f64 = 0.15;
const W_SIMILARITY: f64 = 0.15;

// ---------------------------------------------------------------------------
// ScoredLearning
// ---------------------------------------------------------------------------

/// A learning paired with its computed score. Produced fresh on every query.
#[derive(Debug, Clone)]
pub struct ScoredLearning {
    pub learning: Learning,
    pub score: f64,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Scoring primitives
// ---------------------------------------------------------------------------

/// Time decay: `0.5 + 0.5 * exp(-age/half_life)`. Equals 1 at age zero and
/// approaches, but never drops below, 0.5.
pub fn decay(age_days: f64, half_life_days: f64) -> f64 {
    0.5 + 0.5 * (-age_days.max(0.0) / half_life_days).exp()
}

/// 1.0 at the same scale, 0.6 one level apart, 0.25 further away.
/// A learning with no recorded scale gets the adjacent credit.
fn scale_adjacency(query: ScaleLevel, learning: Option<ScaleLevel>) -> f64 {
    match learning {
        None => 0.6,
        Some(s) => match query.rank().abs_diff(s.rank()) {
            0 => 1.0,
            1 => 0.6,
            _ => 0.25,
        },
    }
}

fn category_match(query: Option<LearningCategory>, learning: LearningCategory) -> f64 {
    match query {
        None => 0.5,
        Some(c) if c == learning => 1.0,
        Some(_) => 0.0,
    }
}

/// Jaccard overlap with an asymmetric rule: when either side has no tags the
/// learning gets a small partial-credit bonus instead of zero, so untagged
/// learnings are dampened rather than eliminated.
fn tag_overlap(learning_tags: &[String], context_tags: &[String]) -> f64 {
    if learning_tags.is_empty() || context_tags.is_empty() {
        return 0.3;
    }
    let a: HashSet<&str> = learning_tags.iter().map(String::as_str).collect();
    let b: HashSet<&str> = context_tags.iter().map(String::as_str).collect();
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

/// Quality and process learnings transfer best across scopes.
fn category_weight(category: LearningCategory) -> f64 {
    match category {
        LearningCategory::Quality | LearningCategory::Process => 1.0,
        _ => 0.8,
    }
}

fn context_similarity(
    learning: &Learning,
    scale: ScaleLevel,
    work_category: Option<LearningCategory>,
    context_tags: &[String],
) -> f64 {
    0.35 * scale_adjacency(scale, learning.scale)
        + 0.30 * category_match(work_category, learning.category)
        + 0.25 * tag_overlap(&learning.tags, context_tags)
        + 0.10 * category_weight(learning.category)
}

/// Score one learning against a query context. Returns the score and the
/// human-readable factor breakdown.
pub fn score_learning(
    learning: &Learning,
    scale: ScaleLevel,
    work_category: Option<LearningCategory>,
    context_tags: &[String],
    half_life_days: f64,
    now: DateTime<Utc>,
) -> (f64, String) {
    let age = learning.age_days(now);
    let decayed = decay(age, half_life_days);
    let similarity = context_similarity(learning, scale, work_category, context_tags);
    let score = W_BASE * learning.relevance_score
        + W_SUCCESS * learning.success_rate
        + W_CONFIDENCE * learning.confidence_score
        + W_DECAY * decayed
        + W_SIMILARITY * similarity;
    let reason = format!(
        "base {:.2}, success {:.2} over {} applications, confidence {:.2}, decay {:.2} at {:.0}d, similarity {:.2}",
        learning.relevance_score,
        learning.success_rate,
        learning.application_count,
        learning.confidence_score,
        decayed,
        age,
        similarity
    );
    (score.clamp(0.0, 1.0), reason)
}

// ---------------------------------------------------------------------------
// LearningApplicationService
// ---------------------------------------------------------------------------

pub struct LearningApplicationService {
    relevance_threshold: f64,
    half_life_days: f64,
}

impl LearningApplicationService {
    pub fn new(config: &CadenceConfig) -> Self {
        Self {
            relevance_threshold: config.relevance_threshold,
            half_life_days: config.decay_half_life_days,
        }
    }

    /// Score the active learnings most relevant to a new piece of work.
    ///
    /// Fetches a bounded candidate set (coarse category filter when the work
    /// category is known), scores each, drops everything under the relevance
    /// threshold, and returns the top `limit` in descending score order with
    /// a stable topic tiebreak.
    pub fn get_relevant_learnings(
        &self,
        store: &CeremonyStore,
        scale: ScaleLevel,
        work_category: Option<LearningCategory>,
        context_tags: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredLearning>> {
        let now = Utc::now();
        let candidates: Vec<Learning> = store
            .list_learnings(true)?
            .into_iter()
            .filter(|l| work_category.map_or(true, |c| l.category == c))
            .take(CANDIDATE_LIMIT)
            .collect();

        let mut scored: Vec<ScoredLearning> = candidates
            .into_iter()
            .filter_map(|learning| {
                let (score, reason) = score_learning(
                    &learning,
                    scale,
                    work_category,
                    context_tags,
                    self.half_life_days,
                    now,
                );
                if score < self.relevance_threshold {
                    debug!(
                        topic = %learning.topic,
                        score,
                        threshold = self.relevance_threshold,
                        "learning below relevance threshold"
                    );
                    return None;
                }
                Some(ScoredLearning {
                    learning,
                    score,
                    reason,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.learning.topic.cmp(&b.learning.topic))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Record one observed application of a learning and update its
    /// statistics (append + recompute in a single store transaction).
    pub fn record_application(
        &self,
        store: &CeremonyStore,
        learning_id: Uuid,
        scope: &str,
        outcome: ApplicationOutcome,
        context: &str,
    ) -> Result<Learning> {
        paths::validate_scope(scope)?;
        let application = LearningApplication::new(learning_id, scope, outcome, context);
        store.record_application(&application)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::Ceremony;
    use crate::types::{CeremonyState, CeremonyType};
    use tempfile::TempDir;

    fn service() -> LearningApplicationService {
        LearningApplicationService::new(&CadenceConfig::default())
    }

    /// Fresh, well-matched fixture: base 0.8, success 1.0, confidence 0.5.
    fn seed_learning(age_days: i64) -> Learning {
        let mut l = Learning::new(
            "tighten gate",
            LearningCategory::Quality,
            "Require a second reviewer for gate fixes",
            vec!["gate".to_string(), "review".to_string()],
            0.8,
        );
        l.scale = Some(ScaleLevel::Medium);
        l.success_rate = 1.0;
        l.confidence_score = 0.5;
        l.indexed_at = Utc::now() - chrono::Duration::days(age_days);
        l
    }

    fn seed_score(age_days: i64) -> f64 {
        let l = seed_learning(age_days);
        let tags = vec!["gate".to_string(), "review".to_string()];
        let (score, _) = score_learning(
            &l,
            ScaleLevel::Medium,
            Some(LearningCategory::Quality),
            &tags,
            180.0,
            Utc::now(),
        );
        score
    }

    #[test]
    fn decay_boundaries() {
        assert!((decay(0.0, 180.0) - 1.0).abs() < 1e-12);
        assert!(decay(1_000_000.0, 180.0) >= 0.5);
        assert!((decay(1_000_000.0, 180.0) - 0.5).abs() < 1e-9);
        // Monotonically non-increasing.
        assert!(decay(10.0, 180.0) > decay(100.0, 180.0));
    }

    #[test]
    fn fresh_learning_scores_084() {
        // 0.30·0.8 + 0.20·1.0 + 0.20·0.5 + 0.15·1.0 + 0.15·1.0
        let score = seed_score(0);
        assert!((score - 0.84).abs() < 1e-6, "score = {score}");
    }

    #[test]
    fn old_learning_stays_above_threshold() {
        // At 400 days the decay sits just above its 0.5 floor, so the
        // score lands near 0.765, far above the 0.2 cutoff.
        let score = seed_score(400);
        assert!((score - 0.765).abs() < 0.01, "score = {score}");
        assert!(score > 0.2);
    }

    #[test]
    fn score_in_unit_interval_for_extremes() {
        let now = Utc::now();
        for base in [0.0, 0.5, 1.0] {
            for rate in [0.0, 1.0] {
                for conf in [0.0, 0.95] {
                    for age in [0, 100, 10_000] {
                        let mut l = seed_learning(age);
                        l.relevance_score = base;
                        l.success_rate = rate;
                        l.confidence_score = conf;
                        l.tags.clear();
                        let (score, _) = score_learning(
                            &l,
                            ScaleLevel::Epic,
                            Some(LearningCategory::Tooling),
                            &[],
                            180.0,
                            now,
                        );
                        assert!((0.0..=1.0).contains(&score), "score = {score}");
                    }
                }
            }
        }
    }

    #[test]
    fn empty_tags_get_partial_credit_not_zero() {
        assert_eq!(tag_overlap(&[], &["a".to_string()]), 0.3);
        assert_eq!(tag_overlap(&["a".to_string()], &[]), 0.3);
        assert_eq!(tag_overlap(&[], &[]), 0.3);
    }

    #[test]
    fn tag_overlap_is_jaccard() {
        let a = vec!["ci".to_string(), "tests".to_string()];
        let b = vec!["tests".to_string(), "deploy".to_string()];
        assert!((tag_overlap(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(tag_overlap(&a, &a), 1.0);
    }

    #[test]
    fn scale_adjacency_tiers() {
        assert_eq!(scale_adjacency(ScaleLevel::Medium, Some(ScaleLevel::Medium)), 1.0);
        assert_eq!(scale_adjacency(ScaleLevel::Medium, Some(ScaleLevel::Large)), 0.6);
        assert_eq!(scale_adjacency(ScaleLevel::Small, Some(ScaleLevel::Epic)), 0.25);
        assert_eq!(scale_adjacency(ScaleLevel::Small, None), 0.6);
    }

    // -----------------------------------------------------------------------
    // Store-backed queries
    // -----------------------------------------------------------------------

    fn store_with(learnings: Vec<Learning>) -> (TempDir, CeremonyStore) {
        let dir = TempDir::new().unwrap();
        let store = CeremonyStore::open(dir.path()).unwrap();
        let mut ceremony = Ceremony::new(CeremonyType::Retrospective, "seed", vec![]);
        ceremony.transition(CeremonyState::Executing).unwrap();
        store.record_ceremony(&ceremony, &[], &learnings).unwrap();
        (dir, store)
    }

    #[test]
    fn query_filters_sorts_and_truncates() {
        let strong = seed_learning(0);
        let mut weak = seed_learning(100_000);
        weak.topic = "weak".to_string();
        weak.relevance_score = 0.0;
        weak.success_rate = 0.0;
        weak.confidence_score = 0.0;
        weak.scale = Some(ScaleLevel::Epic);
        weak.tags.clear();

        let (_dir, store) = store_with(vec![strong.clone(), weak]);
        let svc = service();
        let tags = vec!["gate".to_string(), "review".to_string()];
        let results = svc
            .get_relevant_learnings(
                &store,
                ScaleLevel::Medium,
                Some(LearningCategory::Quality),
                &tags,
                DEFAULT_LIMIT,
            )
            .unwrap();
        // "weak" scores ≈ 0.15·0.5 + 0.15·similarity ≈ 0.16 < 0.2 cutoff.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].learning.topic, strong.topic);
        assert!(results[0].reason.contains("base 0.80"));
    }

    #[test]
    fn category_filter_limits_candidates() {
        let quality = seed_learning(0);
        let mut tooling = seed_learning(0);
        tooling.topic = "cache builds".to_string();
        tooling.category = LearningCategory::Tooling;

        let (_dir, store) = store_with(vec![quality, tooling]);
        let results = service()
            .get_relevant_learnings(
                &store,
                ScaleLevel::Medium,
                Some(LearningCategory::Tooling),
                &[],
                DEFAULT_LIMIT,
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].learning.category, LearningCategory::Tooling);
    }

    #[test]
    fn limit_truncates_descending_order() {
        let mut all = Vec::new();
        for i in 0..4 {
            let mut l = seed_learning(0);
            l.topic = format!("learning-{i}");
            l.relevance_score = 0.2 + 0.2 * i as f64;
            all.push(l);
        }
        let (_dir, store) = store_with(all);
        let results = service()
            .get_relevant_learnings(&store, ScaleLevel::Medium, None, &[], 2)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].learning.topic, "learning-3");
    }

    #[test]
    fn record_application_roundtrip() {
        let learning = seed_learning(0);
        let (_dir, store) = store_with(vec![learning.clone()]);
        let svc = service();

        let updated = svc
            .record_application(
                &store,
                learning.id,
                "epic-2",
                ApplicationOutcome::Partial,
                "applied to epic-2 planning",
            )
            .unwrap();
        assert_eq!(updated.application_count, 1);
        assert!((updated.success_rate - 0.5).abs() < 1e-12);

        let history = store.applications_for(learning.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, ApplicationOutcome::Partial);
    }

    #[test]
    fn record_application_validates_scope() {
        let learning = seed_learning(0);
        let (_dir, store) = store_with(vec![learning.clone()]);
        assert!(service()
            .record_application(
                &store,
                learning.id,
                "BAD SCOPE",
                ApplicationOutcome::Success,
                "",
            )
            .is_err());
        assert!(store.applications_for(learning.id).unwrap().is_empty());
    }
}
