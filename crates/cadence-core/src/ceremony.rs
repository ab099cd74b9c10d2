//! Ceremony and action-item records.
//!
//! A `Ceremony` is created when a trigger fires and walks the state machine
//! documented on [`CeremonyState`]. Once a terminal state is reached the
//! record is never mutated again; `transition` enforces both rules.

use crate::error::{CadenceError, Result};
use crate::types::{CeremonyState, CeremonyType, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ceremony
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ceremony {
    pub id: Uuid,
    pub ceremony_type: CeremonyType,
    pub scope: String,
    pub participants: Vec<String>,
    /// Full dialogue transcript. Empty until the dialogue engine returns.
    #[serde(default)]
    pub transcript: String,
    pub held_at: DateTime<Utc>,
    pub state: CeremonyState,
}

impl Ceremony {
    pub fn new(
        ceremony_type: CeremonyType,
        scope: impl Into<String>,
        participants: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ceremony_type,
            scope: scope.into(),
            participants,
            transcript: String::new(),
            held_at: Utc::now(),
            state: CeremonyState::Triggered,
        }
    }

    /// Move to `to`, rejecting illegal transitions and any mutation of a
    /// terminal ceremony.
    pub fn transition(&mut self, to: CeremonyState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CadenceError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: "ceremony is in a terminal state".to_string(),
            });
        }
        if !self.state.can_transition(to) {
            return Err(CadenceError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: "transition not permitted by the ceremony state machine".to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ActionItem
// ---------------------------------------------------------------------------

/// Created only as part of a ceremony's atomic commit; immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub title: String,
    pub priority: Priority,
    pub scope: String,
    pub ceremony_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ActionItem {
    pub fn new(
        title: impl Into<String>,
        priority: Priority,
        scope: impl Into<String>,
        ceremony_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            priority,
            scope: scope.into(),
            ceremony_id,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
