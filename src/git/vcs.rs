//! The version-control capabilities the stack engine consumes.
//!
//! Everything the sync engine, the branch creator and navigation do to a
//! repository goes through [`VersionControl`], so the engine can be driven by
//! [`GitRepository`](super::GitRepository) in production and by an in-memory
//! repository in tests.

use crate::errors::Result;

/// What to rebase, and onto what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseRequest {
    /// Branch whose commits are replayed
    pub branch: String,
    /// Commit the replayed commits land on
    pub onto: String,
    /// Exclusive lower bound of the commits to replay. When `None`, the
    /// merge base of `branch` and `onto` is used.
    pub upstream: Option<String>,
}

/// Result of a rebase attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseStatus {
    /// Nothing had to be rewritten
    UpToDate,
    /// The branch now points at new commits
    Updated { new_head: String },
    /// The rebase stopped on conflicting changes; the repository is left mid-rebase
    Conflict { files: Vec<String> },
}

/// Result of a force push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// No remote is configured, so there was nothing to push to
    NoRemote,
}

/// Version-control operations used by the stack engine.
///
/// Implementations perform one blocking operation per call. Errors from the
/// underlying tooling are returned as-is; callers add branch context.
pub trait VersionControl {
    /// Name of the checked-out branch. Fails on a detached HEAD.
    fn current_branch_name(&self) -> Result<String>;

    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Whether tracked files have staged or unstaged changes (untracked files
    /// are ignored, like `git diff --quiet HEAD`)
    fn is_dirty(&self) -> Result<bool>;

    fn branch_exists(&self, name: &str) -> bool;

    /// Commit id at the tip of a local branch
    fn branch_head(&self, name: &str) -> Result<String>;

    /// Create a local branch at the current HEAD commit (without checking it out)
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor)
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;

    fn rebase(&self, request: &RebaseRequest) -> Result<RebaseStatus>;

    fn is_rebase_in_progress(&self) -> bool;

    /// Whether the index still has unmerged entries
    fn has_conflicts(&self) -> Result<bool>;

    fn conflicted_files(&self) -> Result<Vec<String>>;

    /// Resume a halted rebase of `branch` after the operator resolved conflicts
    fn continue_rebase(&self, branch: &str) -> Result<RebaseStatus>;

    fn abort_rebase(&self) -> Result<()>;

    fn force_push(&self, branch: &str) -> Result<PushOutcome>;

    /// Latest known commit of the upstream copy of `trunk`, fetching first
    fn resolve_upstream_base_tip(&self, trunk: &str) -> Result<String>;
}
