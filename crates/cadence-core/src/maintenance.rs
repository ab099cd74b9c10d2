//! Periodic upkeep of the learning index.
//!
//! One pass refreshes decay factors, deactivates learnings the evidence no
//! longer supports, marks superseded learnings, and prunes old application
//! rows. Each learning is written in its own transaction, so a failure on one
//! row is logged and skipped without blocking the rest, and a rerun of the
//! same pass is a no-op.

use crate::config::{CadenceConfig, MaintenanceConfig};
use crate::error::Result;
use crate::learning::Learning;
use crate::relevance;
use crate::store::CeremonyStore;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Counts of what one maintenance pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Learnings whose decay factor was refreshed.
    pub decayed: u32,
    /// Learnings deactivated for sustained poor outcomes.
    pub deactivated: u32,
    /// Learnings marked superseded by a newer, more confident one.
    pub superseded: u32,
    /// Application rows pruned past the retention window.
    pub pruned: u32,
}

pub struct MaintenanceJob {
    half_life_days: f64,
    maintenance: MaintenanceConfig,
}

impl MaintenanceJob {
    pub fn new(config: &CadenceConfig) -> Self {
        Self {
            half_life_days: config.decay_half_life_days,
            maintenance: config.maintenance.clone(),
        }
    }

    pub fn run(&self, store: &CeremonyStore, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        let mut learnings = store.list_learnings(true)?;

        for learning in &mut learnings {
            let fresh = relevance::decay(learning.age_days(now), self.half_life_days);
            let mut dirty = false;
            if (learning.decay_factor - fresh).abs() > 1e-9 {
                learning.decay_factor = fresh;
                report.decayed += 1;
                dirty = true;
            }
            if self.should_deactivate(learning) {
                learning.active = false;
                report.deactivated += 1;
                dirty = true;
                info!(
                    topic = %learning.topic,
                    confidence = learning.confidence_score,
                    success_rate = learning.success_rate,
                    applications = learning.application_count,
                    "deactivating learning with sustained poor outcomes"
                );
            }
            if dirty {
                if let Err(e) = store.update_learning(learning) {
                    warn!(id = %learning.id, error = %e, "skipping learning update");
                }
            }
        }

        report.superseded = self.mark_superseded(store, &learnings)?;

        let cutoff = now - Duration::days(i64::from(self.maintenance.application_retention_days));
        report.pruned = store.prune_applications(cutoff)?;

        info!(
            decayed = report.decayed,
            deactivated = report.deactivated,
            superseded = report.superseded,
            pruned = report.pruned,
            "maintenance pass complete"
        );
        Ok(report)
    }

    fn should_deactivate(&self, learning: &Learning) -> bool {
        learning.application_count >= self.maintenance.min_applications
            && learning.confidence_score < self.maintenance.min_confidence
            && learning.success_rate < self.maintenance.min_success_rate
    }

    /// An older learning is superseded when a newer one in the same category
    /// beats its confidence by the configured margin. The older row keeps its
    /// content but goes inactive with a pointer to its replacement.
    fn mark_superseded(&self, store: &CeremonyStore, learnings: &[Learning]) -> Result<u32> {
        let mut count = 0u32;
        for older in learnings {
            if !older.active || older.superseded_by.is_some() {
                continue;
            }
            let replacement = learnings
                .iter()
                .filter(|newer| {
                    newer.id != older.id
                        && newer.active
                        && newer.superseded_by.is_none()
                        && newer.category == older.category
                        && newer.indexed_at > older.indexed_at
                        && newer.confidence_score
                            >= older.confidence_score + self.maintenance.supersede_margin
                })
                .max_by(|a, b| {
                    a.confidence_score
                        .partial_cmp(&b.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            let Some(newer) = replacement else { continue };

            let mut updated = older.clone();
            updated.superseded_by = Some(newer.id);
            updated.active = false;
            match store.update_learning(&updated) {
                Ok(()) => {
                    count += 1;
                    info!(
                        old = %older.topic,
                        new = %newer.topic,
                        "learning superseded"
                    );
                }
                Err(e) => warn!(id = %older.id, error = %e, "skipping supersede update"),
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
