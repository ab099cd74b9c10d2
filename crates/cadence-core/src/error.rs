use thiserror::Error;

use crate::dialogue::DialogueFailure;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("invalid scope '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidScope(String),

    #[error("invalid ceremony type: {0}")]
    InvalidCeremonyType(String),

    #[error("invalid learning category: {0}")]
    InvalidCategory(String),

    #[error("invalid scale: {0}")]
    InvalidScale(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("ceremony not found: {0}")]
    CeremonyNotFound(String),

    #[error("learning not found: {0}")]
    LearningNotFound(String),

    #[error("{ceremony_type} ceremony failed for scope '{scope}': work sequence aborted")]
    CeremonyAborted {
        ceremony_type: String,
        scope: String,
    },

    #[error("dialogue failure: {0}")]
    Dialogue(DialogueFailure),

    #[error("store error: {0}")]
    Store(String),

    #[error("version control error: {0}")]
    Vcs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CadenceError>;
