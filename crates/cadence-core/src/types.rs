use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CeremonyType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyType {
    Planning,
    Standup,
    Retrospective,
}

impl CeremonyType {
    pub fn all() -> &'static [CeremonyType] {
        &[
            CeremonyType::Planning,
            CeremonyType::Standup,
            CeremonyType::Retrospective,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyType::Planning => "planning",
            CeremonyType::Standup => "standup",
            CeremonyType::Retrospective => "retrospective",
        }
    }
}

impl fmt::Display for CeremonyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CeremonyType {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(CeremonyType::Planning),
            "standup" => Ok(CeremonyType::Standup),
            "retrospective" => Ok(CeremonyType::Retrospective),
            _ => Err(crate::error::CadenceError::InvalidCeremonyType(
                s.to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// CeremonyState
// ---------------------------------------------------------------------------

/// Lifecycle state of a ceremony.
///
/// Transitions: `Triggered → Executing → Committed | Failed`;
/// `Failed → Retrying → Executing` a bounded number of times, then the
/// terminal states `Aborted` or `Skipped`. A ceremony in a terminal state
/// is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyState {
    Triggered,
    Executing,
    Committed,
    Failed,
    Retrying,
    Aborted,
    Skipped,
}

impl CeremonyState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CeremonyState::Committed | CeremonyState::Aborted | CeremonyState::Skipped
        )
    }

    pub fn can_transition(self, to: CeremonyState) -> bool {
        use CeremonyState::*;
        matches!(
            (self, to),
            (Triggered, Executing)
                | (Executing, Committed)
                | (Executing, Failed)
                | (Failed, Retrying)
                | (Failed, Aborted)
                | (Failed, Skipped)
                | (Retrying, Executing)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyState::Triggered => "triggered",
            CeremonyState::Executing => "executing",
            CeremonyState::Committed => "committed",
            CeremonyState::Failed => "failed",
            CeremonyState::Retrying => "retrying",
            CeremonyState::Aborted => "aborted",
            CeremonyState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CeremonyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// LearningCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCategory {
    Quality,
    Process,
    Architectural,
    Technical,
    Communication,
    Tooling,
}

impl LearningCategory {
    pub fn all() -> &'static [LearningCategory] {
        &[
            LearningCategory::Quality,
            LearningCategory::Process,
            LearningCategory::Architectural,
            LearningCategory::Technical,
            LearningCategory::Communication,
            LearningCategory::Tooling,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LearningCategory::Quality => "quality",
            LearningCategory::Process => "process",
            LearningCategory::Architectural => "architectural",
            LearningCategory::Technical => "technical",
            LearningCategory::Communication => "communication",
            LearningCategory::Tooling => "tooling",
        }
    }
}

impl fmt::Display for LearningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LearningCategory {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quality" => Ok(LearningCategory::Quality),
            "process" => Ok(LearningCategory::Process),
            "architectural" => Ok(LearningCategory::Architectural),
            "technical" => Ok(LearningCategory::Technical),
            "communication" => Ok(LearningCategory::Communication),
            "tooling" => Ok(LearningCategory::Tooling),
            _ => Err(crate::error::CadenceError::InvalidCategory(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScaleLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleLevel {
    Small,
    Medium,
    Large,
    Epic,
}

impl ScaleLevel {
    /// Numeric rank used for adjacency scoring: Small=0 … Epic=3.
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScaleLevel::Small => "small",
            ScaleLevel::Medium => "medium",
            ScaleLevel::Large => "large",
            ScaleLevel::Epic => "epic",
        }
    }
}

impl fmt::Display for ScaleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScaleLevel {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(ScaleLevel::Small),
            "medium" => Ok(ScaleLevel::Medium),
            "large" => Ok(ScaleLevel::Large),
            "epic" => Ok(ScaleLevel::Epic),
            _ => Err(crate::error::CadenceError::InvalidScale(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplicationOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationOutcome {
    Success,
    Failure,
    Partial,
}

impl fmt::Display for ApplicationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationOutcome::Success => "success",
            ApplicationOutcome::Failure => "failure",
            ApplicationOutcome::Partial => "partial",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ceremony_type_roundtrip() {
        for ty in CeremonyType::all() {
            let parsed = CeremonyType::from_str(ty.as_str()).unwrap();
            assert_eq!(*ty, parsed);
        }
        assert!(CeremonyType::from_str("bogus").is_err());
    }

    #[test]
    fn category_roundtrip() {
        for cat in LearningCategory::all() {
            let parsed = LearningCategory::from_str(cat.as_str()).unwrap();
            assert_eq!(*cat, parsed);
        }
    }

    #[test]
    fn scale_rank_ordering() {
        assert!(ScaleLevel::Small < ScaleLevel::Medium);
        assert!(ScaleLevel::Large < ScaleLevel::Epic);
        assert_eq!(ScaleLevel::Small.rank(), 0);
        assert_eq!(ScaleLevel::Epic.rank(), 3);
    }

    #[test]
    fn state_machine_legal_transitions() {
        use CeremonyState::*;
        assert!(Triggered.can_transition(Executing));
        assert!(Executing.can_transition(Committed));
        assert!(Executing.can_transition(Failed));
        assert!(Failed.can_transition(Retrying));
        assert!(Retrying.can_transition(Executing));
        assert!(Failed.can_transition(Aborted));
        assert!(Failed.can_transition(Skipped));
    }

    #[test]
    fn state_machine_illegal_transitions() {
        use CeremonyState::*;
        assert!(!Committed.can_transition(Executing));
        assert!(!Aborted.can_transition(Retrying));
        assert!(!Triggered.can_transition(Committed));
        assert!(!Executing.can_transition(Retrying));
    }

    #[test]
    fn terminal_states() {
        assert!(CeremonyState::Committed.is_terminal());
        assert!(CeremonyState::Aborted.is_terminal());
        assert!(CeremonyState::Skipped.is_terminal());
        assert!(!CeremonyState::Failed.is_terminal());
        assert!(!CeremonyState::Retrying.is_terminal());
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&CeremonyType::Retrospective).unwrap();
        assert_eq!(json, "\"retrospective\"");
        let cat: LearningCategory = serde_json::from_str("\"architectural\"").unwrap();
        assert_eq!(cat, LearningCategory::Architectural);
    }
}
