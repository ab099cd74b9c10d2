//! Version-control glue for ceremony commits.
//!
//! The ceremony commit spans two resources: the durable store and the
//! project's git history. The store commit runs first; `commit_paths` then
//! commits exactly the touched artifacts. The orchestrator only marks a
//! ceremony recorded once both have succeeded, and re-runs the git side via
//! the reconciliation pass when it was interrupted in between.

use crate::error::{CadenceError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub struct Vcs {
    root: PathBuf,
}

impl Vcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns a handle only when the git binary is available and `root` is
    /// inside a repository. Callers treat `None` as "no VCS configured" and
    /// skip the git half of the ceremony commit.
    pub fn detect(root: &Path) -> Option<Self> {
        which::which("git").ok()?;
        let vcs = Self::new(root);
        if vcs.is_repo() {
            Some(vcs)
        } else {
            None
        }
    }

    pub fn is_repo(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&self.root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Stage and commit the named paths with `message`.
    ///
    /// Committing paths that are already recorded (identical content) is not
    /// an error: the reconciliation pass may re-run a commit whose git half
    /// actually landed before the crash.
    pub fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.run_git_add(paths)?;

        let mut cmd = Command::new("git");
        cmd.args(["commit", "-m", message])
            .arg("--")
            .current_dir(&self.root);
        for path in paths {
            cmd.arg(path);
        }
        let output = cmd
            .output()
            .map_err(|e| CadenceError::Vcs(format!("failed to run git commit: {e}")))?;
        if output.status.success() {
            debug!(message, "committed ceremony artifacts");
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("nothing to commit") || stdout.contains("nothing added to commit") {
            debug!(message, "artifacts already committed");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(CadenceError::Vcs(format!(
            "git commit failed: {}",
            if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            }
        )))
    }

    fn run_git_add(&self, paths: &[PathBuf]) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.arg("add").arg("--").current_dir(&self.root);
        for path in paths {
            cmd.arg(path);
        }
        let output = cmd
            .output()
            .map_err(|e| CadenceError::Vcs(format!("failed to run git add: {e}")))?;
        if !output.status.success() {
            return Err(CadenceError::Vcs(format!(
                "git add failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
