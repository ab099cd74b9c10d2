//! Ceremony execution: dialogue with a deadline, a staged two-resource
//! commit, and policy-driven retries.
//!
//! A `hold` call drives one ceremony through its state machine. The dialogue
//! collaborator runs under `tokio::time::timeout`; its output is recorded by
//! a single store transaction (summary row + action items + learnings +
//! transcript) followed by a git commit of the transcript artifact. The
//! ceremony is flipped to `Committed` only after both resources succeed; a
//! crash or git failure in between leaves it `Executing` in the store, and
//! `reconcile` later completes the git half.

use crate::ceremony::{ActionItem, Ceremony};
use crate::config::CadenceConfig;
use crate::dialogue::{DialogueEngine, DialogueFailure, DialogueOutput};
use crate::error::{CadenceError, Result};
use crate::failure::{FailureAction, FailureHandler};
use crate::io;
use crate::learning::Learning;
use crate::paths;
use crate::store::CeremonyStore;
use crate::trigger::TriggerState;
use crate::types::{CeremonyState, CeremonyType};
use crate::vcs::Vcs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Retry backoff: 2s, 4s, 8s, … capped at 30s.
fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(4);
    Duration::from_secs((2u64 << exp).min(30))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Everything one committed ceremony produced.
#[derive(Debug, Clone)]
pub struct RecordedCeremony {
    pub ceremony: Ceremony,
    pub action_items: Vec<ActionItem>,
    pub learnings: Vec<Learning>,
}

#[derive(Debug)]
pub enum CeremonyResult {
    /// Recorded in both the store and version control.
    Committed(RecordedCeremony),
    /// Store rows committed; the VCS commit failed and is left for
    /// [`CeremonyOrchestrator::reconcile`]. The ceremony stays `Executing`.
    PendingVcs(RecordedCeremony),
    /// Execution failed and policy let the work sequence continue; the
    /// ceremony reached terminal `Skipped` and nothing was recorded.
    Skipped { reason: String },
}

// ---------------------------------------------------------------------------
// CeremonyOrchestrator
// ---------------------------------------------------------------------------

pub struct CeremonyOrchestrator<'a, D: DialogueEngine> {
    root: PathBuf,
    dialogue: D,
    store: &'a CeremonyStore,
    vcs: Option<Vcs>,
    config: CadenceConfig,
}

impl<'a, D: DialogueEngine> CeremonyOrchestrator<'a, D> {
    pub fn new(
        root: impl Into<PathBuf>,
        dialogue: D,
        store: &'a CeremonyStore,
        vcs: Option<Vcs>,
        config: CadenceConfig,
    ) -> Self {
        Self {
            root: root.into(),
            dialogue,
            store,
            vcs,
            config,
        }
    }

    /// Hold one ceremony for a scope.
    ///
    /// Failures are classified through `handler`; an `Abort` action surfaces
    /// as [`CadenceError::CeremonyAborted`] so the caller halts the work
    /// sequence. A committed ceremony updates `trigger_state` so the limit
    /// and cooldown gates see it on the next evaluation.
    pub async fn hold(
        &self,
        ceremony_type: CeremonyType,
        scope: &str,
        participants: Vec<String>,
        context: &str,
        handler: &mut FailureHandler,
        trigger_state: &mut TriggerState,
    ) -> Result<CeremonyResult> {
        paths::validate_scope(scope)?;
        let mut ceremony = Ceremony::new(ceremony_type, scope, participants);
        let mut attempt = 1u32;

        loop {
            ceremony.transition(CeremonyState::Executing)?;

            let outcome = match self.execute_once(&ceremony, context).await {
                Ok(output) => self.record(&mut ceremony, output),
                Err(failure) => Err(CadenceError::Dialogue(failure)),
            };

            match outcome {
                Ok(CeremonyResult::Committed(recorded)) => {
                    handler.on_success(scope, ceremony_type);
                    trigger_state.record_fired(scope, ceremony_type, ceremony.held_at);
                    return Ok(CeremonyResult::Committed(recorded));
                }
                Ok(pending @ CeremonyResult::PendingVcs(_)) => {
                    // The store half landed: count the failure, keep the
                    // cooldown honest, and leave the git half to reconcile.
                    handler.on_failure(scope, ceremony_type, attempt);
                    trigger_state.record_fired(scope, ceremony_type, ceremony.held_at);
                    return Ok(pending);
                }
                Ok(skipped @ CeremonyResult::Skipped { .. }) => return Ok(skipped),
                Err(err) => {
                    warn!(
                        scope,
                        %ceremony_type,
                        attempt,
                        error = %err,
                        "ceremony execution failed"
                    );
                    ceremony.transition(CeremonyState::Failed)?;
                    match handler.on_failure(scope, ceremony_type, attempt) {
                        FailureAction::Abort => {
                            ceremony.transition(CeremonyState::Aborted)?;
                            return Err(CadenceError::CeremonyAborted {
                                ceremony_type: ceremony_type.to_string(),
                                scope: scope.to_string(),
                            });
                        }
                        FailureAction::Retry { remaining } => {
                            info!(scope, %ceremony_type, remaining, "retrying ceremony");
                            ceremony.transition(CeremonyState::Retrying)?;
                            tokio::time::sleep(backoff(attempt)).await;
                            attempt += 1;
                        }
                        FailureAction::Continue | FailureAction::SkipFuture => {
                            ceremony.transition(CeremonyState::Skipped)?;
                            return Ok(CeremonyResult::Skipped {
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Run the dialogue collaborator under the configured deadline.
    async fn execute_once(
        &self,
        ceremony: &Ceremony,
        context: &str,
    ) -> std::result::Result<DialogueOutput, DialogueFailure> {
        let seconds = self.config.ceremony_timeout_seconds;
        let fut = self.dialogue.facilitate(
            ceremony.ceremony_type,
            &ceremony.scope,
            &ceremony.participants,
            context,
        );
        match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
            Ok(result) => result,
            Err(_) => Err(DialogueFailure::Timeout { seconds }),
        }
    }

    /// The staged two-resource commit: transcript file, store transaction,
    /// then the git commit, then the recorded-state flip.
    fn record(&self, ceremony: &mut Ceremony, output: DialogueOutput) -> Result<CeremonyResult> {
        ceremony.transcript = output.transcript;

        let action_items: Vec<ActionItem> = output
            .action_items
            .into_iter()
            .map(|d| ActionItem::new(d.title, d.priority, ceremony.scope.clone(), ceremony.id))
            .collect();
        let learnings: Vec<Learning> = output
            .learnings
            .into_iter()
            .map(|d| {
                let mut learning =
                    Learning::new(d.topic, d.category, d.content, d.tags, d.relevance_score);
                learning.scale = d.scale;
                learning
            })
            .collect();

        let transcript_file = paths::transcript_path(
            &self.root,
            &ceremony.scope,
            ceremony.ceremony_type,
            ceremony.held_at,
        );
        io::atomic_write(&transcript_file, ceremony.transcript.as_bytes())?;

        self.store
            .record_ceremony(ceremony, &action_items, &learnings)?;

        if let Err(err) = self.commit_to_vcs(ceremony, &transcript_file) {
            warn!(
                scope = %ceremony.scope,
                ceremony_type = %ceremony.ceremony_type,
                error = %err,
                "store commit landed but VCS commit failed; left for reconciliation"
            );
            return Ok(CeremonyResult::PendingVcs(RecordedCeremony {
                ceremony: ceremony.clone(),
                action_items,
                learnings,
            }));
        }

        let committed = self
            .store
            .set_ceremony_state(ceremony.id, CeremonyState::Committed)?;
        ceremony.state = committed.state;
        info!(
            scope = %ceremony.scope,
            ceremony_type = %ceremony.ceremony_type,
            action_items = action_items.len(),
            learnings = learnings.len(),
            "ceremony committed"
        );
        Ok(CeremonyResult::Committed(RecordedCeremony {
            ceremony: ceremony.clone(),
            action_items,
            learnings,
        }))
    }

    fn commit_to_vcs(&self, ceremony: &Ceremony, transcript_file: &Path) -> Result<()> {
        let Some(vcs) = &self.vcs else {
            return Ok(());
        };
        let message = format!(
            "cadence: {} ceremony for {}",
            ceremony.ceremony_type, ceremony.scope
        );
        vcs.commit_paths(&[transcript_file.to_path_buf()], &message)
    }

    /// Complete the git half for every ceremony left in the
    /// store-committed-but-unrecorded state. Returns how many were finished.
    pub fn reconcile(&self) -> Result<u32> {
        let mut completed = 0u32;
        for ceremony in self.store.pending_vcs()? {
            let transcript_file = paths::transcript_path(
                &self.root,
                &ceremony.scope,
                ceremony.ceremony_type,
                ceremony.held_at,
            );
            if !transcript_file.exists() {
                io::atomic_write(&transcript_file, ceremony.transcript.as_bytes())?;
            }
            if let Err(err) = self.commit_to_vcs(&ceremony, &transcript_file) {
                warn!(
                    scope = %ceremony.scope,
                    ceremony_type = %ceremony.ceremony_type,
                    error = %err,
                    "reconciliation: VCS commit still failing"
                );
                continue;
            }
            self.store
                .set_ceremony_state(ceremony.id, CeremonyState::Committed)?;
            completed += 1;
        }
        Ok(completed)
    }

    pub fn store(&self) -> &CeremonyStore {
        self.store
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
