use crate::errors::{Result, StackwiseError};
use crate::git::vcs::{PushOutcome, RebaseRequest, RebaseStatus, VersionControl};
use git2::{build::CheckoutBuilder, Oid, Repository, RepositoryState};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info, warn};

/// Wrapper around git2::Repository with the operations the stack engine needs
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
    remote: String,
}

impl GitRepository {
    /// Open a Git repository at (or above) the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| StackwiseError::config(format!("Not a git repository: {}", e)))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| StackwiseError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
            remote: "origin".to_string(),
        })
    }

    /// Use `remote` for fetching the trunk and pushing branches
    pub fn with_remote<S: Into<String>>(mut self, remote: S) -> Self {
        self.remote = remote.into();
        self
    }

    /// Working directory of the repository
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-worktree git directory (`.git` for a normal checkout)
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Git directory shared by all worktrees of this repository
    pub fn common_dir(&self) -> &Path {
        self.repo.commondir()
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| StackwiseError::not_found(format!("Could not get HEAD: {}", e)))?;

        if !head.is_branch() {
            return Err(StackwiseError::precondition(
                "HEAD is detached; check out a branch first",
            ));
        }

        head.shorthand()
            .map(|name| name.to_string())
            .ok_or_else(|| StackwiseError::config("Current branch name is not valid UTF-8"))
    }

    /// Get the HEAD commit hash
    pub fn get_head_commit_hash(&self) -> Result<String> {
        let commit = self
            .repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| StackwiseError::not_found(format!("Could not get HEAD commit: {}", e)))?;

        Ok(commit.id().to_string())
    }

    /// Check if tracked files have uncommitted changes
    pub fn is_dirty(&self) -> Result<bool> {
        let mut options = git2::StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);

        let statuses = self.repo.statuses(Some(&mut options))?;

        for status in statuses.iter() {
            let flags = status.status();

            if flags.intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::WT_TYPECHANGE
                    | git2::Status::CONFLICTED,
            ) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Create a new branch at `target` (a revision) or at HEAD
    pub fn create_branch(&self, name: &str, target: Option<&str>) -> Result<()> {
        let target_commit = match target {
            Some(target) => self.resolve_commit(target)?,
            None => self
                .repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(|e| {
                    StackwiseError::not_found(format!("Could not get HEAD commit: {}", e))
                })?,
        };

        self.repo.branch(name, &target_commit, false).map_err(|e| {
            StackwiseError::validation(format!("Could not create branch '{}': {}", name, e))
        })?;

        info!("Created branch '{}' at {}", name, target_commit.id());
        Ok(())
    }

    /// Switch to a branch, refusing to overwrite local modifications
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .map_err(|e| {
                StackwiseError::not_found(format!("Could not find branch '{}': {}", name, e))
            })?;

        let tree = branch.get().peel_to_tree()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))?;

        self.repo.set_head(&format!("refs/heads/{}", name))?;

        debug!("Switched to branch '{}'", name);
        Ok(())
    }

    /// Check if a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, git2::BranchType::Local).is_ok()
    }

    /// Get the commit hash at the head of a branch
    pub fn get_branch_head(&self, branch_name: &str) -> Result<String> {
        let branch = self
            .repo
            .find_branch(branch_name, git2::BranchType::Local)
            .map_err(|e| {
                StackwiseError::not_found(format!(
                    "Could not find branch '{}': {}",
                    branch_name, e
                ))
            })?;

        let commit = branch.get().peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Resolve a revision (branch, tag, commit hash) to a commit
    pub fn resolve_commit(&self, reference: &str) -> Result<git2::Commit<'_>> {
        let obj = self.repo.revparse_single(reference).map_err(|e| {
            StackwiseError::not_found(format!("Could not resolve '{}': {}", reference, e))
        })?;

        obj.peel_to_commit().map_err(|e| {
            StackwiseError::not_found(format!("'{}' does not point to a commit: {}", reference, e))
        })
    }

    /// Whether `ancestor` is reachable from `descendant`
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let ancestor = Oid::from_str(ancestor)?;
        let descendant = Oid::from_str(descendant)?;
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    /// Whether a rebase (of any flavour) has stopped in this worktree
    pub fn is_rebase_in_progress(&self) -> bool {
        matches!(
            self.repo.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
                | RepositoryState::ApplyMailboxOrRebase
        )
    }

    /// Check for merge conflicts in the index
    pub fn has_conflicts(&self) -> Result<bool> {
        let mut index = self.repo.index()?;
        // The index may have been rewritten by the git executable
        index.read(false)?;
        Ok(index.has_conflicts())
    }

    /// Get list of conflicted files
    pub fn get_conflicted_files(&self) -> Result<Vec<String>> {
        let mut index = self.repo.index()?;
        index.read(false)?;

        let mut conflicts = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                if let Ok(path) = std::str::from_utf8(&entry.path) {
                    conflicts.push(path.to_string());
                }
            }
        }

        Ok(conflicts)
    }

    /// Replay `request.branch` onto `request.onto` with the git executable.
    ///
    /// Conflicts leave the repository mid-rebase so they can be resolved with
    /// ordinary git tooling and resumed with `continue_rebase`.
    pub fn rebase_branch(&self, request: &RebaseRequest) -> Result<RebaseStatus> {
        let head_before = self.get_branch_head(&request.branch)?;

        let mut args = vec!["rebase"];
        match &request.upstream {
            Some(upstream) => {
                args.extend(["--onto", request.onto.as_str(), upstream.as_str()]);
            }
            None => args.push(request.onto.as_str()),
        }
        args.push(request.branch.as_str());

        let output = self.run_git(&args)?;
        if output.status.success() {
            let head_after = self.get_branch_head(&request.branch)?;
            if head_after == head_before {
                return Ok(RebaseStatus::UpToDate);
            }
            info!(
                "Rebased '{}' onto {}: {} -> {}",
                request.branch, request.onto, head_before, head_after
            );
            return Ok(RebaseStatus::Updated {
                new_head: head_after,
            });
        }

        if self.is_rebase_in_progress() {
            let files = self.get_conflicted_files()?;
            warn!(
                "Rebase of '{}' stopped with {} conflicted file(s)",
                request.branch,
                files.len()
            );
            return Ok(RebaseStatus::Conflict { files });
        }

        Err(StackwiseError::rebase(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    /// Resume the stopped rebase of `branch`
    pub fn continue_rebase(&self, branch: &str) -> Result<RebaseStatus> {
        if !self.is_rebase_in_progress() {
            return Err(StackwiseError::precondition("No rebase is in progress"));
        }

        let output = self.run_git(&["rebase", "--continue"])?;
        if output.status.success() {
            let new_head = self.get_branch_head(branch)?;
            info!("Finished rebase of '{}' at {}", branch, new_head);
            return Ok(RebaseStatus::Updated { new_head });
        }

        if self.is_rebase_in_progress() {
            let files = self.get_conflicted_files()?;
            return Ok(RebaseStatus::Conflict { files });
        }

        Err(StackwiseError::rebase(format!(
            "git rebase --continue failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    /// Abort the stopped rebase, restoring the branch to its pre-rebase tip
    pub fn abort_rebase(&self) -> Result<()> {
        let output = self.run_git(&["rebase", "--abort"])?;
        if !output.status.success() {
            return Err(StackwiseError::rebase(format!(
                "git rebase --abort failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("Rebase aborted");
        Ok(())
    }

    /// Fetch `branch` from the configured remote into its remote-tracking ref
    pub fn fetch_branch(&self, branch: &str) -> Result<()> {
        debug!("Fetching '{}' from '{}'", branch, self.remote);

        let mut remote = self.repo.find_remote(&self.remote).map_err(|e| {
            StackwiseError::not_found(format!("No remote '{}' found: {}", self.remote, e))
        })?;

        let refspec = format!(
            "+refs/heads/{branch}:refs/remotes/{}/{branch}",
            self.remote
        );
        let attempts = Cell::new(0);
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(self.remote_callbacks(&attempts));

        remote.fetch(&[&refspec], Some(&mut fetch_options), None)?;
        Ok(())
    }

    /// Force push a branch to the same name on the configured remote
    pub fn force_push_branch(&self, branch: &str) -> Result<PushOutcome> {
        let mut remote = match self.repo.find_remote(&self.remote) {
            Ok(remote) => remote,
            Err(_) => {
                warn!(
                    "No remote '{}' configured; not pushing '{}'",
                    self.remote, branch
                );
                return Ok(PushOutcome::NoRemote);
            }
        };

        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        let attempts = Cell::new(0);
        let mut callbacks = self.remote_callbacks(&attempts);
        callbacks.push_update_reference(|refname, status| match status {
            Some(message) => Err(git2::Error::from_str(&format!(
                "remote rejected {refname}: {message}"
            ))),
            None => Ok(()),
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        remote
            .push(&[&refspec], Some(&mut push_options))
            .map_err(|e| StackwiseError::push(format!("Failed to force push {}: {}", branch, e)))?;

        info!("Force pushed '{}' to '{}'", branch, self.remote);
        Ok(PushOutcome::Pushed)
    }

    /// Latest commit of the remote trunk, falling back to the local trunk
    /// when there is no remote copy
    pub fn upstream_trunk_tip(&self, trunk: &str) -> Result<String> {
        if self.repo.find_remote(&self.remote).is_ok() {
            self.fetch_branch(trunk)?;
            let remote_ref = format!("refs/remotes/{}/{}", self.remote, trunk);
            if let Ok(oid) = self.repo.refname_to_id(&remote_ref) {
                return Ok(oid.to_string());
            }
            warn!("'{}' has no remote copy; using local '{}'", remote_ref, trunk);
        } else {
            warn!(
                "No remote '{}' configured; using local '{}' as the upstream base",
                self.remote, trunk
            );
        }

        self.get_branch_head(trunk)
    }

    /// Credential callbacks shared by fetch and push. Gives up after a few
    /// attempts instead of letting libgit2 retry the same credential forever.
    fn remote_callbacks<'a>(&self, attempts: &'a Cell<u32>) -> git2::RemoteCallbacks<'a> {
        const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }

            if let Some(username) = username_from_url {
                if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                    return git2::Cred::ssh_key_from_agent(username);
                }
            }
            git2::Cred::default()
        });
        callbacks
    }

    /// Run the git executable in the working directory. Editors are disabled
    /// so `rebase --continue` never blocks waiting for a commit message.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        debug!("Running git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .env("GIT_EDITOR", "true")
            .env("GIT_SEQUENCE_EDITOR", "true")
            .output()
            .map_err(|e| {
                StackwiseError::rebase(format!("Failed to execute git {}: {e}", args.join(" ")))
            })
    }
}

impl VersionControl for GitRepository {
    fn current_branch_name(&self) -> Result<String> {
        self.get_current_branch()
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        GitRepository::checkout_branch(self, name)
    }

    fn is_dirty(&self) -> Result<bool> {
        GitRepository::is_dirty(self)
    }

    fn branch_exists(&self, name: &str) -> bool {
        GitRepository::branch_exists(self, name)
    }

    fn branch_head(&self, name: &str) -> Result<String> {
        self.get_branch_head(name)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        GitRepository::create_branch(self, name, None)
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        GitRepository::is_ancestor(self, ancestor, descendant)
    }

    fn rebase(&self, request: &RebaseRequest) -> Result<RebaseStatus> {
        self.rebase_branch(request)
    }

    fn is_rebase_in_progress(&self) -> bool {
        GitRepository::is_rebase_in_progress(self)
    }

    fn has_conflicts(&self) -> Result<bool> {
        GitRepository::has_conflicts(self)
    }

    fn conflicted_files(&self) -> Result<Vec<String>> {
        self.get_conflicted_files()
    }

    fn continue_rebase(&self, branch: &str) -> Result<RebaseStatus> {
        GitRepository::continue_rebase(self, branch)
    }

    fn abort_rebase(&self) -> Result<()> {
        GitRepository::abort_rebase(self)
    }

    fn force_push(&self, branch: &str) -> Result<PushOutcome> {
        self.force_push_branch(branch)
    }

    fn resolve_upstream_base_tip(&self, trunk: &str) -> Result<String> {
        self.upstream_trunk_tip(trunk)
    }
}
