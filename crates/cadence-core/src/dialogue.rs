//! Boundary to the external dialogue collaborator.
//!
//! The engine never generates conversation itself: it hands a ceremony type,
//! scope, and context to a [`DialogueEngine`] implementation and gets back a
//! transcript plus draft action items and learnings. The orchestrator wraps
//! the call in a deadline; a blown deadline is a [`DialogueFailure::Timeout`].

use crate::types::{CeremonyType, LearningCategory, Priority, ScaleLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// Action item as produced by the dialogue engine, before it is bound to a
/// ceremony id at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftActionItem {
    pub title: String,
    pub priority: Priority,
}

/// Learning as produced by the dialogue engine, before indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftLearning {
    pub topic: String,
    pub category: LearningCategory,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Author-assigned baseline relevance in [0,1].
    pub relevance_score: f64,
    /// Scale of the scope the insight came from, when the collaborator
    /// reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleLevel>,
}

// ---------------------------------------------------------------------------
// DialogueOutput / DialogueFailure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueOutput {
    pub transcript: String,
    pub action_items: Vec<DraftActionItem>,
    pub learnings: Vec<DraftLearning>,
}

/// Classified failure raised by (or on behalf of) the dialogue collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueFailure {
    /// The call exceeded the configured deadline and was cancelled.
    Timeout { seconds: u64 },
    /// The collaborator ran but could not produce usable output.
    Generation(String),
    /// The call was cancelled from outside before completing.
    Cancelled,
}

impl fmt::Display for DialogueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueFailure::Timeout { seconds } => {
                write!(f, "dialogue timed out after {seconds}s")
            }
            DialogueFailure::Generation(msg) => write!(f, "generation error: {msg}"),
            DialogueFailure::Cancelled => f.write_str("dialogue cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// DialogueEngine
// ---------------------------------------------------------------------------

/// The external conversation collaborator.
///
/// Implementations drive whatever dialogue machinery actually holds the
/// ceremony. The future must resolve within the orchestrator's deadline;
/// past it, the orchestrator drops the future and records a timeout.
pub trait DialogueEngine {
    fn facilitate(
        &self,
        ceremony_type: CeremonyType,
        scope: &str,
        participants: &[String],
        context: &str,
    ) -> impl std::future::Future<Output = Result<DialogueOutput, DialogueFailure>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
