use crate::error::{CadenceError, Result};
use crate::types::CeremonyType;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CADENCE_DIR: &str = ".cadence";
pub const CEREMONIES_DIR: &str = ".cadence/ceremonies";

pub const CONFIG_FILE: &str = ".cadence/config.yaml";
pub const DB_FILE: &str = ".cadence/cadence.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

pub fn scope_dir(root: &Path, scope: &str) -> PathBuf {
    root.join(CEREMONIES_DIR).join(scope)
}

/// Transcript file path for one ceremony: `.cadence/ceremonies/<scope>/<type>-<ts>.md`
pub fn transcript_path(
    root: &Path,
    scope: &str,
    ceremony_type: CeremonyType,
    held_at: DateTime<Utc>,
) -> PathBuf {
    scope_dir(root, scope).join(format!(
        "{}-{}.md",
        ceremony_type.as_str(),
        held_at.format("%Y%m%dT%H%M%SZ")
    ))
}

// ---------------------------------------------------------------------------
// Scope validation
// ---------------------------------------------------------------------------

fn scope_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap())
}

/// Validate a scope identifier: lowercase alphanumeric segments joined by
/// single hyphens (e.g. `epic-9`, `auth-login`).
pub fn validate_scope(scope: &str) -> Result<()> {
    if scope_regex().is_match(scope) {
        Ok(())
    } else {
        Err(CadenceError::InvalidScope(scope.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
