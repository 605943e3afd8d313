//! Stack synchronization.
//!
//! A sync walks a stack parent-before-child, rebasing every branch onto the
//! current tip of its parent. Each branch's outcome is reported as soon as it
//! is known. A conflict halts the walk with the repository left mid-rebase and
//! the unvisited branches saved as a [`PendingSync`], which `continue_sync`
//! picks up once the conflict is resolved.

use crate::errors::{Result, StackwiseError};
use crate::git::{PushOutcome, RebaseRequest, RebaseStatus, VersionControl};
use crate::stack::branch::BranchRecord;
use crate::stack::store::RelationshipStore;
use crate::stack::sync_state::PendingSync;
use crate::stack::tree::{current_root, TreeNode};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sync only the checked-out branch, leaving its descendants alone
    pub current_only: bool,
    /// Rebase onto the latest upstream commit of the trunk the stack hangs from
    pub trunk: bool,
    /// Never force-push updated branches
    pub no_push: bool,
    /// Re-parent the checked-out branch before syncing
    pub parent_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    AlreadyUpToDate,
    Updated { new_head: String, pushed: bool },
    Conflict { files: Vec<String> },
}

impl SyncStatus {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncStatus::Conflict { .. })
    }
}

/// Result of syncing one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub branch: String,
    pub parent: String,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// One entry per branch visited, in walk order
    pub outcomes: Vec<SyncOutcome>,
    /// Branches left for `--continue` when the walk halted on a conflict
    pub remaining: Vec<String>,
}

impl SyncReport {
    /// The outcome the walk halted on, if it halted
    pub fn conflict(&self) -> Option<&SyncOutcome> {
        self.outcomes.last().filter(|o| o.status.is_conflict())
    }

    pub fn is_halted(&self) -> bool {
        self.conflict().is_some()
    }

    pub fn updated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SyncStatus::Updated { .. }))
            .count()
    }
}

/// Receives progress while a walk runs
pub trait SyncObserver {
    fn step_started(&mut self, _branch: &str, _parent: &str) {}
    fn step_finished(&mut self, _outcome: &SyncOutcome) {}
}

impl SyncObserver for () {}

/// Settings that stay fixed for a whole walk, including its continuation
#[derive(Debug, Clone)]
struct WalkContext {
    original_branch: String,
    trunk_root: Option<String>,
    trunk_tip: Option<String>,
    no_push: bool,
}

impl From<&PendingSync> for WalkContext {
    fn from(pending: &PendingSync) -> Self {
        Self {
            original_branch: pending.original_branch.clone(),
            trunk_root: pending.trunk_root.clone(),
            trunk_tip: pending.trunk_tip.clone(),
            no_push: pending.no_push,
        }
    }
}

/// Checks the original branch back out when a walk ends, unless disarmed
struct RestoreBranchGuard<'a> {
    vcs: &'a dyn VersionControl,
    original: String,
    armed: bool,
}

impl<'a> RestoreBranchGuard<'a> {
    fn new(vcs: &'a dyn VersionControl, original: &str) -> Self {
        Self {
            vcs,
            original: original.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RestoreBranchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if matches!(self.vcs.current_branch_name(), Ok(ref current) if *current == self.original) {
            return;
        }
        if self.vcs.is_rebase_in_progress() {
            warn!(
                "A rebase is still in progress; staying put instead of switching to '{}'",
                self.original
            );
            return;
        }
        match self.vcs.checkout_branch(&self.original) {
            Ok(()) => debug!("Restored original branch '{}'", self.original),
            Err(e) => warn!("Could not switch back to '{}': {}", self.original, e),
        }
    }
}

pub struct SyncEngine<'a> {
    vcs: &'a dyn VersionControl,
    store: &'a RelationshipStore,
    state_dir: PathBuf,
    push: bool,
}

impl<'a> SyncEngine<'a> {
    /// `state_dir` holds the pending-sync file (the per-worktree git directory)
    pub fn new(vcs: &'a dyn VersionControl, store: &'a RelationshipStore, state_dir: &Path) -> Self {
        Self {
            vcs,
            store,
            state_dir: state_dir.to_path_buf(),
            push: true,
        }
    }

    /// Whether updated branches are pushed when the run does not ask for `no_push`
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Sync the stack containing the checked-out branch, applying
    /// `parent_override` first. A run rejected before the walk starts leaves
    /// the branch's previous parent in place.
    pub fn run(&self, options: &SyncOptions, observer: &mut dyn SyncObserver) -> Result<SyncReport> {
        self.check_ready()?;
        let current = self.vcs.current_branch_name()?;

        let previous = match &options.parent_override {
            Some(parent) => {
                if !self.vcs.branch_exists(parent) {
                    return Err(StackwiseError::not_found(format!(
                        "Parent branch '{parent}' does not exist"
                    )));
                }
                let previous = self.store.get(&current)?;
                self.store.set_parent(&current, parent)?;
                info!("'{}' now stacked on '{}'", current, parent);
                Some(previous)
            }
            None => None,
        };

        let prepared = current_root(self.store, &current)
            .and_then(|root| self.prepare(&root, &current, options));
        let (plan, ctx) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Some(previous) = previous {
                    match self.store.restore(&current, previous) {
                        Ok(()) => debug!("Reverted parent of '{}'", current),
                        Err(restore_err) => {
                            warn!("Could not revert parent of '{}': {}", current, restore_err)
                        }
                    }
                }
                return Err(e);
            }
        };
        self.walk(&plan, &ctx, observer)
    }

    /// Sync the descendants of `root` (or only the checked-out branch with
    /// `current_only`). `parent_override` is applied by [`run`](Self::run).
    pub fn sync(
        &self,
        root: &TreeNode,
        options: &SyncOptions,
        observer: &mut dyn SyncObserver,
    ) -> Result<SyncReport> {
        self.check_ready()?;
        let current = self.vcs.current_branch_name()?;
        let (plan, ctx) = self.prepare(root, &current, options)?;
        self.walk(&plan, &ctx, observer)
    }

    /// Work out which branches to visit and check them, touching nothing
    fn prepare(
        &self,
        root: &TreeNode,
        current: &str,
        options: &SyncOptions,
    ) -> Result<(Vec<String>, WalkContext)> {
        let plan: Vec<String> = if options.current_only {
            match root.find(current) {
                Some(node) if node.branch.parent.is_some() => vec![current.to_string()],
                _ => Vec::new(),
            }
        } else {
            root.descendants()
                .into_iter()
                .map(|node| node.name().to_string())
                .collect()
        };
        if plan.is_empty() {
            return Err(StackwiseError::precondition(format!(
                "Nothing to sync: no branches are stacked below '{current}'"
            )));
        }

        let (trunk_root, trunk_tip) = if options.trunk {
            let base = if options.current_only {
                self.store.require(current)?.parent.unwrap_or_default()
            } else {
                root.name().to_string()
            };
            if !self.store.is_trunk(&base) {
                return Err(StackwiseError::validation(format!(
                    "--trunk only applies to a stack rooted on a trunk branch; '{base}' is not one"
                )));
            }
            let tip = self
                .vcs
                .resolve_upstream_base_tip(&base)
                .map_err(|e| StackwiseError::on_branch("fetch", base.clone(), e))?;
            info!("Upstream '{}' is at {}", base, tip);
            (Some(base), Some(tip))
        } else {
            (None, None)
        };

        let ctx = WalkContext {
            original_branch: current.to_string(),
            trunk_root,
            trunk_tip,
            no_push: options.no_push,
        };
        self.verify(&plan, &ctx)?;
        Ok((plan, ctx))
    }

    /// Resume a sync that halted on a conflict
    pub fn continue_sync(&self, observer: &mut dyn SyncObserver) -> Result<SyncReport> {
        let pending = PendingSync::load(&self.state_dir)?;
        let branch = pending.conflicted_branch.clone();

        if self.vcs.has_conflicts()? {
            let files = self.vcs.conflicted_files()?;
            return Err(StackwiseError::precondition(format!(
                "'{}' still has unresolved conflicts ({}); resolve and stage them, then continue",
                branch,
                files.join(", ")
            )));
        }

        let ctx = WalkContext::from(&pending);
        self.verify(&pending.remaining, &ctx)?;

        // Failures from here on leave the operator on the original branch
        let mut guard = RestoreBranchGuard::new(self.vcs, &pending.original_branch);
        observer.step_started(&branch, &pending.conflicted_parent);
        let status = if self.vcs.is_rebase_in_progress() {
            let rebased = self
                .vcs
                .continue_rebase(&branch)
                .map_err(|e| StackwiseError::on_branch("continue rebase of", branch.clone(), e))?;
            match rebased {
                RebaseStatus::Updated { new_head } => {
                    self.finish_update(&branch, &pending.onto, new_head, ctx.no_push)?
                }
                RebaseStatus::UpToDate => {
                    self.store
                        .record_synced_parent_commit(&branch, &pending.onto)?;
                    SyncStatus::AlreadyUpToDate
                }
                RebaseStatus::Conflict { files } => SyncStatus::Conflict { files },
            }
        } else {
            // The rebase was finished or aborted with plain git
            let head = self
                .vcs
                .branch_head(&branch)
                .map_err(|e| StackwiseError::on_branch("read", branch.clone(), e))?;
            if self.vcs.is_ancestor(&pending.onto, &head)? {
                self.finish_update(&branch, &pending.onto, head, ctx.no_push)?
            } else {
                if self.vcs.is_dirty()? {
                    guard.disarm();
                    return Err(StackwiseError::precondition(
                        "Working tree has uncommitted changes; commit or stash them before continuing",
                    ));
                }
                let record = self.store.require(&branch)?;
                self.sync_branch(&record, &pending.onto, ctx.no_push)?
            }
        };

        let outcome = SyncOutcome {
            branch: branch.clone(),
            parent: pending.conflicted_parent.clone(),
            status,
        };
        observer.step_finished(&outcome);

        let mut report = SyncReport::default();
        let halted = outcome.status.is_conflict();
        report.outcomes.push(outcome);
        if halted {
            report.remaining = pending.remaining.clone();
            guard.disarm();
            pending.save(&self.state_dir)?;
            warn!("'{}' conflicted again", branch);
            return Ok(report);
        }

        PendingSync::delete(&self.state_dir)?;
        // The walk restores the original branch itself, or stays put on a conflict
        guard.disarm();
        let rest = self.walk(&pending.remaining, &ctx, observer)?;
        report.outcomes.extend(rest.outcomes);
        report.remaining = rest.remaining;
        Ok(report)
    }

    /// Abandon a halted sync: abort the rebase and return to the branch the
    /// sync started from
    pub fn abort_sync(&self) -> Result<PendingSync> {
        let pending = PendingSync::load(&self.state_dir)?;

        if self.vcs.is_rebase_in_progress() {
            self.vcs.abort_rebase().map_err(|e| {
                StackwiseError::on_branch("abort rebase of", pending.conflicted_branch.clone(), e)
            })?;
        }
        PendingSync::delete(&self.state_dir)?;

        if let Err(e) = self.vcs.checkout_branch(&pending.original_branch) {
            warn!(
                "Could not switch back to '{}': {}",
                pending.original_branch, e
            );
        }
        info!("Aborted sync halted on '{}'", pending.conflicted_branch);
        Ok(pending)
    }

    /// Refusals that apply before anything is touched
    fn check_ready(&self) -> Result<()> {
        if PendingSync::exists(&self.state_dir) {
            return Err(StackwiseError::precondition(
                "A sync is already in progress; run `sw stack sync --continue` or `sw stack sync --abort`",
            ));
        }
        if self.vcs.is_rebase_in_progress() {
            return Err(StackwiseError::precondition(
                "A rebase is in progress; finish or abort it first",
            ));
        }
        if self.vcs.is_dirty()? {
            return Err(StackwiseError::precondition(
                "Working tree has uncommitted changes; commit or stash them before syncing",
            ));
        }
        Ok(())
    }

    /// Fail before any mutation if a branch in the walk, or its parent, is gone
    fn verify(&self, plan: &[String], ctx: &WalkContext) -> Result<()> {
        for branch in plan {
            if !self.vcs.branch_exists(branch) {
                return Err(StackwiseError::not_found(format!(
                    "Tracked branch '{branch}' no longer exists"
                )));
            }
            let parent = self.parent_of(&self.store.require(branch)?)?;
            if ctx.trunk_root.as_deref() != Some(parent.as_str())
                && !self.vcs.branch_exists(&parent)
            {
                return Err(StackwiseError::not_found(format!(
                    "Parent '{parent}' of '{branch}' no longer exists"
                )));
            }
        }
        Ok(())
    }

    fn walk(
        &self,
        plan: &[String],
        ctx: &WalkContext,
        observer: &mut dyn SyncObserver,
    ) -> Result<SyncReport> {
        let mut guard = RestoreBranchGuard::new(self.vcs, &ctx.original_branch);
        let mut report = SyncReport::default();

        for (index, branch) in plan.iter().enumerate() {
            let record = self.store.require(branch)?;
            let parent = self.parent_of(&record)?;
            let parent_tip = match (&ctx.trunk_root, &ctx.trunk_tip) {
                (Some(trunk), Some(tip)) if *trunk == parent => tip.clone(),
                _ => self
                    .vcs
                    .branch_head(&parent)
                    .map_err(|e| StackwiseError::on_branch("read", parent.clone(), e))?,
            };

            observer.step_started(branch, &parent);
            let status = self.sync_branch(&record, &parent_tip, ctx.no_push)?;
            let outcome = SyncOutcome {
                branch: branch.clone(),
                parent: parent.clone(),
                status,
            };
            observer.step_finished(&outcome);

            let halted = outcome.status.is_conflict();
            report.outcomes.push(outcome);
            if halted {
                let pending = PendingSync {
                    original_branch: ctx.original_branch.clone(),
                    conflicted_branch: branch.clone(),
                    conflicted_parent: parent,
                    onto: parent_tip,
                    remaining: plan[index + 1..].to_vec(),
                    trunk_root: ctx.trunk_root.clone(),
                    trunk_tip: ctx.trunk_tip.clone(),
                    no_push: ctx.no_push,
                    started_at: Utc::now(),
                };
                pending.save(&self.state_dir)?;
                report.remaining = pending.remaining;
                // The operator resolves the conflict on the conflicted branch
                guard.disarm();
                warn!("Sync halted on '{}'", branch);
                return Ok(report);
            }
        }

        Ok(report)
    }

    /// Bring one branch up to date with `parent_tip`
    fn sync_branch(&self, record: &BranchRecord, parent_tip: &str, no_push: bool) -> Result<SyncStatus> {
        let branch = record.name.as_str();
        self.vcs
            .checkout_branch(branch)
            .map_err(|e| StackwiseError::on_branch("checkout", branch, e))?;
        let head = self
            .vcs
            .branch_head(branch)
            .map_err(|e| StackwiseError::on_branch("read", branch, e))?;

        if self.vcs.is_ancestor(parent_tip, &head)? {
            if record.parent_synced_commit.as_deref() != Some(parent_tip) {
                self.store.record_synced_parent_commit(branch, parent_tip)?;
            }
            debug!("'{}' already contains {}", branch, parent_tip);
            return Ok(SyncStatus::AlreadyUpToDate);
        }

        // Replay only the branch's own commits when the old parent tip is known
        let upstream = match record.parent_synced_commit.as_deref() {
            Some(watermark) if watermark != parent_tip && self.vcs.is_ancestor(watermark, &head)? => {
                Some(watermark.to_string())
            }
            _ => None,
        };

        let request = RebaseRequest {
            branch: branch.to_string(),
            onto: parent_tip.to_string(),
            upstream,
        };
        let rebased = self
            .vcs
            .rebase(&request)
            .map_err(|e| StackwiseError::on_branch("rebase", branch, e))?;

        match rebased {
            RebaseStatus::UpToDate => {
                self.store.record_synced_parent_commit(branch, parent_tip)?;
                Ok(SyncStatus::AlreadyUpToDate)
            }
            RebaseStatus::Updated { new_head } => {
                self.finish_update(branch, parent_tip, new_head, no_push)
            }
            RebaseStatus::Conflict { files } => Ok(SyncStatus::Conflict { files }),
        }
    }

    /// Record the watermark of a rewritten branch and push it
    fn finish_update(
        &self,
        branch: &str,
        parent_tip: &str,
        new_head: String,
        no_push: bool,
    ) -> Result<SyncStatus> {
        self.store.record_synced_parent_commit(branch, parent_tip)?;

        let pushed = if self.push && !no_push {
            let outcome = self
                .vcs
                .force_push(branch)
                .map_err(|e| StackwiseError::on_branch("push", branch, e))?;
            outcome == PushOutcome::Pushed
        } else {
            false
        };

        info!("Updated '{}' to {}", branch, new_head);
        Ok(SyncStatus::Updated { new_head, pushed })
    }

    fn parent_of(&self, record: &BranchRecord) -> Result<String> {
        record.parent.clone().ok_or_else(|| {
            StackwiseError::structural(format!("'{}' has no parent to sync against", record.name))
        })
    }
}
