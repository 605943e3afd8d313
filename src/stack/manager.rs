use super::branch::BranchRecord;
use super::creator;
use super::navigation;
use super::store::RelationshipStore;
use super::sync::{SyncEngine, SyncObserver, SyncOptions, SyncReport};
use super::sync_state::PendingSync;
use super::tree::{self, TreeNode};
use crate::config::{get_repo_state_dir, load_settings, Settings};
use crate::errors::Result;
use crate::git::{GitRepository, VersionControl};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entry point for every stack operation on one repository
pub struct StackManager {
    /// Git repository interface
    repo: GitRepository,
    /// Per-worktree git directory, home of the pending sync
    git_dir: PathBuf,
    settings: Settings,
    store: RelationshipStore,
}

impl StackManager {
    /// Create a new StackManager for the given repository
    pub fn new(repo_path: &Path) -> Result<Self> {
        let repo = GitRepository::open(repo_path)?;
        let common_dir = repo.common_dir().to_path_buf();
        let git_dir = repo.git_dir().to_path_buf();

        let settings = load_settings(&common_dir, &repo)?;
        let repo = repo.with_remote(settings.git.remote.clone());
        let store = RelationshipStore::open(
            &get_repo_state_dir(&common_dir),
            vec![settings.git.trunk_branch.clone()],
        );
        debug!(
            "Opened {} (trunk '{}', store {})",
            repo.path().display(),
            settings.git.trunk_branch,
            store.path().display()
        );

        Ok(Self {
            repo,
            git_dir,
            settings,
            store,
        })
    }

    /// Create a stacked branch and check it out
    pub fn create_branch(&self, name: &str, parent: Option<&str>) -> Result<BranchRecord> {
        creator::create_branch(&self.repo, &self.store, name, parent)
    }

    /// Every tracked stack
    pub fn forest(&self) -> Result<Vec<TreeNode>> {
        tree::build_forest(&self.store)
    }

    /// The stack the checked-out branch belongs to
    pub fn current_stack(&self) -> Result<TreeNode> {
        let current = self.repo.current_branch_name()?;
        tree::current_root(&self.store, &current)
    }

    pub fn sync(&self, options: &SyncOptions, observer: &mut dyn SyncObserver) -> Result<SyncReport> {
        self.engine().run(options, observer)
    }

    pub fn continue_sync(&self, observer: &mut dyn SyncObserver) -> Result<SyncReport> {
        self.engine().continue_sync(observer)
    }

    pub fn abort_sync(&self) -> Result<PendingSync> {
        self.engine().abort_sync()
    }

    /// The halted sync, if one is waiting
    pub fn pending_sync(&self) -> Result<Option<PendingSync>> {
        if !PendingSync::exists(&self.git_dir) {
            return Ok(None);
        }
        PendingSync::load(&self.git_dir).map(Some)
    }

    pub fn next(&self, n: i64) -> Result<String> {
        navigation::next_branch(&self.repo, &self.store, n)
    }

    pub fn prev(&self, n: i64) -> Result<String> {
        navigation::prev_branch(&self.repo, &self.store, n)
    }

    pub fn git_repo(&self) -> &GitRepository {
        &self.repo
    }

    fn engine(&self) -> SyncEngine<'_> {
        SyncEngine::new(&self.repo, &self.store, &self.git_dir).with_push(self.settings.sync.push)
    }
}
