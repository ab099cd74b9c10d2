//! Workflow adjustment: translating high-scoring learnings into concrete
//! changes to a planned sequence of work steps.
//!
//! Adjustments are all-or-nothing. The adjusted plan is validated as a DAG
//! before it replaces the original; on any validation failure the whole
//! batch is discarded and the caller gets the input plan back unchanged.

use crate::config::CadenceConfig;
use crate::relevance::ScoredLearning;
use crate::types::{LearningCategory, ScaleLevel};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// WorkStep
// ---------------------------------------------------------------------------

/// One step in a planned sequence of work. Names are unique within a plan.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkStep {
    pub name: String,
    pub phase: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkStep {
    pub fn new(name: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            depends_on: Vec::new(),
            required: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Adjustments
// ---------------------------------------------------------------------------

/// A step to insert, positioned after `anchor` when one is named.
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub step: WorkStep,
    /// Existing step the new one should follow. A missing anchor is not an
    /// error: the step is appended with no dependencies.
    pub anchor: Option<String>,
    /// Whether this adjustment counts toward the per-pass cap.
    pub counts_toward_cap: bool,
}

/// Maps a learning category to the adjustment it suggests, if any.
pub type AdjustmentHandler =
    fn(learning: &ScoredLearning, scale: ScaleLevel) -> Option<Adjustment>;

fn quality_handler(scored: &ScoredLearning, _scale: ScaleLevel) -> Option<Adjustment> {
    let mut step = WorkStep::new(
        format!("verify-{}", slugify(&scored.learning.topic)),
        "verification",
    );
    step.metadata
        .insert("learning_id".to_string(), scored.learning.id.to_string());
    Some(Adjustment {
        step,
        anchor: Some("implementation".to_string()),
        counts_toward_cap: false,
    })
}

fn architectural_handler(scored: &ScoredLearning, scale: ScaleLevel) -> Option<Adjustment> {
    // Architecture reviews only pay off once the work is big enough.
    if scale < ScaleLevel::Medium {
        return None;
    }
    let mut step = WorkStep::new(
        format!("review-{}", slugify(&scored.learning.topic)),
        "review",
    );
    step.metadata
        .insert("learning_id".to_string(), scored.learning.id.to_string());
    Some(Adjustment {
        step,
        anchor: Some("design".to_string()),
        counts_toward_cap: false,
    })
}

fn technical_handler(scored: &ScoredLearning, _scale: ScaleLevel) -> Option<Adjustment> {
    let mut step = WorkStep::new(
        format!("spike-{}", slugify(&scored.learning.topic)),
        "investigation",
    );
    step.metadata
        .insert("learning_id".to_string(), scored.learning.id.to_string());
    Some(Adjustment {
        step,
        anchor: Some("planning".to_string()),
        counts_toward_cap: false,
    })
}

fn process_handler(scored: &ScoredLearning, _scale: ScaleLevel) -> Option<Adjustment> {
    let mut step = WorkStep::new(
        format!("checkpoint-{}", slugify(&scored.learning.topic)),
        "ceremony",
    );
    step.metadata
        .insert("learning_id".to_string(), scored.learning.id.to_string());
    Some(Adjustment {
        step,
        anchor: None,
        counts_toward_cap: true,
    })
}

fn slugify(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len());
    let mut last_dash = true;
    for ch in topic.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Registry of per-category adjustment handlers. Ships with defaults for the
/// categories that map naturally onto plan changes; callers may override.
pub struct AdjustmentRegistry {
    handlers: HashMap<LearningCategory, AdjustmentHandler>,
}

impl Default for AdjustmentRegistry {
    fn default() -> Self {
        let mut handlers: HashMap<LearningCategory, AdjustmentHandler> = HashMap::new();
        handlers.insert(LearningCategory::Quality, quality_handler);
        handlers.insert(LearningCategory::Architectural, architectural_handler);
        handlers.insert(LearningCategory::Technical, technical_handler);
        handlers.insert(LearningCategory::Process, process_handler);
        // Communication and Tooling learnings inform people, not plans.
        Self { handlers }
    }
}

impl AdjustmentRegistry {
    pub fn register(&mut self, category: LearningCategory, handler: AdjustmentHandler) {
        self.handlers.insert(category, handler);
    }

    fn propose(&self, scored: &ScoredLearning, scale: ScaleLevel) -> Option<Adjustment> {
        self.handlers
            .get(&scored.learning.category)
            .and_then(|h| h(scored, scale))
    }
}

// ---------------------------------------------------------------------------
// WorkflowAdjuster
// ---------------------------------------------------------------------------

pub struct WorkflowAdjuster {
    registry: AdjustmentRegistry,
    max_capped_adjustments: u32,
}

impl WorkflowAdjuster {
    pub fn new(config: &CadenceConfig) -> Self {
        Self {
            registry: AdjustmentRegistry::default(),
            max_capped_adjustments: config.max_ceremony_adjustments_per_pass,
        }
    }

    pub fn with_registry(config: &CadenceConfig, registry: AdjustmentRegistry) -> Self {
        Self {
            registry,
            max_capped_adjustments: config.max_ceremony_adjustments_per_pass,
        }
    }

    /// Apply the adjustments suggested by a scored learning set to a plan.
    ///
    /// Learnings are visited in the given (descending-score) order. The
    /// resulting plan is validated in one shot; a dangling dependency or a
    /// cycle discards the whole batch and returns the original unchanged.
    pub fn apply(
        &self,
        steps: &[WorkStep],
        scored: &[ScoredLearning],
        scale: ScaleLevel,
    ) -> Vec<WorkStep> {
        let mut adjusted = steps.to_vec();
        let mut capped_used = 0u32;

        for s in scored {
            let Some(adjustment) = self.registry.propose(s, scale) else {
                continue;
            };
            if adjustment.counts_toward_cap {
                if capped_used >= self.max_capped_adjustments {
                    debug!(
                        topic = %s.learning.topic,
                        cap = self.max_capped_adjustments,
                        "adjustment cap reached, skipping"
                    );
                    continue;
                }
                capped_used += 1;
            }
            if adjusted.iter().any(|w| w.name == adjustment.step.name) {
                debug!(step = %adjustment.step.name, "step already present, skipping");
                continue;
            }
            insert_step(&mut adjusted, adjustment);
        }

        if let Err(reason) = validate_dag(&adjusted) {
            warn!(%reason, "adjusted plan failed validation, keeping original");
            return steps.to_vec();
        }
        info!(
            before = steps.len(),
            after = adjusted.len(),
            "workflow adjusted"
        );
        adjusted
    }
}

fn insert_step(plan: &mut Vec<WorkStep>, adjustment: Adjustment) {
    let Adjustment { mut step, anchor, .. } = adjustment;
    match anchor {
        Some(ref name) => match plan.iter().position(|w| w.name == *name) {
            Some(pos) => {
                step.depends_on = vec![name.clone()];
                plan.insert(pos + 1, step);
            }
            None => {
                debug!(anchor = %name, step = %step.name, "anchor not in plan, appending");
                step.depends_on.clear();
                plan.push(step);
            }
        },
        None => plan.push(step),
    }
}

/// Kahn's algorithm over step names. Rejects dangling dependency references
/// and cycles.
fn validate_dag(plan: &[WorkStep]) -> std::result::Result<(), String> {
    let names: HashSet<&str> = plan.iter().map(|w| w.name.as_str()).collect();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in plan {
        indegree.entry(step.name.as_str()).or_insert(0);
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.name
                ));
            }
            edges.entry(dep.as_str()).or_default().push(step.name.as_str());
            *indegree.entry(step.name.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut visited = 0usize;
    while let Some(name) = queue.pop_front() {
        visited += 1;
        if let Some(next) = edges.get(name) {
            for n in next {
                let d = indegree.entry(*n).or_insert(0);
                *d = d.saturating_sub(1);
                if *d == 0 {
                    queue.push_back(n);
                }
            }
        }
    }
    if visited != plan.len() {
        return Err("dependency cycle in adjusted plan".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
