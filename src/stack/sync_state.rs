use crate::errors::{Result, StackwiseError};
use crate::utils::atomic_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "stackwise-sync.json";

/// A sync halted on a conflict, waiting for `--continue` or `--abort`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PendingSync {
    /// Branch checked out before the sync started
    pub original_branch: String,
    /// Branch whose rebase stopped
    pub conflicted_branch: String,
    /// Parent it was being rebased onto
    pub conflicted_parent: String,
    /// Commit the stopped rebase targets
    pub onto: String,
    /// Branches still to sync, in walk order
    pub remaining: Vec<String>,
    /// Trunk whose upstream tip stands in for its local head, if `--trunk` was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk_tip: Option<String>,
    pub no_push: bool,
    pub started_at: DateTime<Utc>,
}

impl PendingSync {
    /// Location of the state file inside a per-worktree git directory
    pub fn path(git_dir: &Path) -> PathBuf {
        git_dir.join(STATE_FILE)
    }

    /// Save sync state to disk
    pub fn save(&self, git_dir: &Path) -> Result<()> {
        let state_path = Self::path(git_dir);
        atomic_file::write_json(&state_path, self)?;
        tracing::debug!("Saved sync state to {:?}", state_path);
        Ok(())
    }

    /// Load sync state from disk
    pub fn load(git_dir: &Path) -> Result<Self> {
        let state_path = Self::path(git_dir);
        let state = atomic_file::read_json(&state_path)?.ok_or_else(|| {
            StackwiseError::precondition("No sync in progress. Nothing to continue.")
        })?;

        tracing::debug!("Loaded sync state from {:?}", state_path);
        Ok(state)
    }

    /// Delete sync state file
    pub fn delete(git_dir: &Path) -> Result<()> {
        let state_path = Self::path(git_dir);

        if state_path.exists() {
            std::fs::remove_file(&state_path)
                .map_err(|e| StackwiseError::config(format!("Failed to delete sync state: {e}")))?;
            tracing::debug!("Deleted sync state file");
        }

        Ok(())
    }

    pub fn exists(git_dir: &Path) -> bool {
        Self::path(git_dir).exists()
    }
}
