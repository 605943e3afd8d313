//! In-memory repository for exercising the stack engine without git.
//!
//! History is strictly linear per commit (one parent each), which is all the
//! engine ever produces. Every mutating call is appended to a log so tests can
//! assert on the exact sequence of operations.

use crate::errors::{Result, StackwiseError};
use crate::git::vcs::{PushOutcome, RebaseRequest, RebaseStatus, VersionControl};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug)]
struct StoppedRebase {
    branch: String,
    onto: String,
    commits: Vec<String>,
    resolved: bool,
}

#[derive(Debug, Default)]
struct State {
    parents: HashMap<String, Option<String>>,
    branches: BTreeMap<String, String>,
    head: String,
    dirty: bool,
    conflict_on: HashSet<String>,
    rebase: Option<StoppedRebase>,
    upstream_tips: HashMap<String, String>,
    failing_pushes: HashSet<String>,
    pushed: Vec<String>,
    log: Vec<String>,
    next_id: u32,
}

impl State {
    fn new_commit(&mut self, parent: Option<String>) -> String {
        self.next_id += 1;
        let id = format!("c{}", self.next_id);
        self.parents.insert(id.clone(), parent);
        id
    }

    fn ancestors(&self, commit: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut cursor = Some(commit.to_string());
        while let Some(id) = cursor {
            cursor = self.parents.get(&id).cloned().flatten();
            chain.push(id);
        }
        chain
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.ancestors(descendant).iter().any(|c| c == ancestor)
    }

    fn head_of(&self, branch: &str) -> Result<String> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StackwiseError::not_found(format!("no branch '{branch}'")))
    }

    /// Commits of `head` not reachable from `base`, oldest first
    fn commits_since(&self, head: &str, base: &str) -> Vec<String> {
        let excluded: HashSet<String> = self.ancestors(base).into_iter().collect();
        let mut commits: Vec<String> = self
            .ancestors(head)
            .into_iter()
            .take_while(|c| !excluded.contains(c))
            .collect();
        commits.reverse();
        commits
    }

    fn replay(&mut self, onto: &str, commits: &[String]) -> String {
        let mut tip = onto.to_string();
        for _ in commits {
            tip = self.new_commit(Some(tip));
        }
        tip
    }
}

pub(crate) struct MemoryRepo {
    state: RefCell<State>,
}

impl MemoryRepo {
    /// Repository with one commit on `trunk`, which is checked out
    pub fn new(trunk: &str) -> Self {
        let mut state = State::default();
        let root = state.new_commit(None);
        state.branches.insert(trunk.to_string(), root);
        state.head = trunk.to_string();
        Self {
            state: RefCell::new(state),
        }
    }

    /// Add a commit on top of `branch` and return its id
    pub fn commit(&self, branch: &str) -> String {
        let mut state = self.state.borrow_mut();
        let parent = state.branches.get(branch).cloned();
        let id = state.new_commit(parent);
        state.branches.insert(branch.to_string(), id.clone());
        id
    }

    /// Create `name` at the tip of `from`
    pub fn branch_from(&self, name: &str, from: &str) {
        let mut state = self.state.borrow_mut();
        let tip = state.branches[from].clone();
        state.branches.insert(name.to_string(), tip);
    }

    pub fn set_head(&self, branch: &str) {
        self.state.borrow_mut().head = branch.to_string();
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.state.borrow_mut().dirty = dirty;
    }

    /// Make the next rebase of `branch` stop with a conflict
    pub fn conflict_on(&self, branch: &str) {
        self.state.borrow_mut().conflict_on.insert(branch.to_string());
    }

    /// Make pushes of `branch` fail
    pub fn fail_push(&self, branch: &str) {
        self.state.borrow_mut().failing_pushes.insert(branch.to_string());
    }

    /// Stage a resolution for the stopped rebase
    pub fn resolve_conflicts(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(rebase) = state.rebase.as_mut() {
            rebase.resolved = true;
            let branch = rebase.branch.clone();
            state.conflict_on.remove(&branch);
        }
    }

    /// Commit that only exists on the remote copy of `trunk`, built on the
    /// local trunk tip
    pub fn advance_upstream(&self, trunk: &str) -> String {
        let mut state = self.state.borrow_mut();
        let base = state
            .upstream_tips
            .get(trunk)
            .cloned()
            .unwrap_or_else(|| state.branches[trunk].clone());
        let id = state.new_commit(Some(base));
        state.upstream_tips.insert(trunk.to_string(), id.clone());
        id
    }

    pub fn head(&self, branch: &str) -> String {
        self.state.borrow().branches[branch].clone()
    }

    pub fn contains(&self, branch: &str, commit: &str) -> bool {
        let state = self.state.borrow();
        state.is_ancestor(commit, &state.branches[branch])
    }

    pub fn checked_out(&self) -> String {
        self.state.borrow().head.clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.state.borrow().pushed.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Log entries of one kind ("rebase", "push", ...)
    pub fn log_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind} ");
        self.log()
            .into_iter()
            .filter(|entry| entry.starts_with(&prefix))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }
}

impl VersionControl for MemoryRepo {
    fn current_branch_name(&self) -> Result<String> {
        Ok(self.state.borrow().head.clone())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.head_of(name)?;
        state.head = name.to_string();
        state.log.push(format!("checkout {name}"));
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self.state.borrow().dirty)
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.state.borrow().branches.contains_key(name)
    }

    fn branch_head(&self, name: &str) -> Result<String> {
        self.state.borrow().head_of(name)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(name) {
            return Err(StackwiseError::validation(format!("'{name}' exists")));
        }
        let current = state.head.clone();
        let tip = state.head_of(&current)?;
        state.branches.insert(name.to_string(), tip);
        state.log.push(format!("create {name}"));
        Ok(())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let state = self.state.borrow();
        if let Some(unknown) = [ancestor, descendant]
            .into_iter()
            .find(|id| !state.parents.contains_key(*id))
        {
            return Err(StackwiseError::not_found(format!("no commit '{unknown}'")));
        }
        Ok(state.is_ancestor(ancestor, descendant))
    }

    fn rebase(&self, request: &RebaseRequest) -> Result<RebaseStatus> {
        let mut state = self.state.borrow_mut();
        let head = state.head_of(&request.branch)?;
        state.head = request.branch.clone();
        state.log.push(format!("rebase {} onto {}", request.branch, request.onto));

        let base = request.upstream.as_deref().unwrap_or(&request.onto).to_string();
        let commits = state.commits_since(&head, &base);

        let first_parent = commits
            .first()
            .and_then(|c| state.parents.get(c).cloned().flatten());
        let already_there = match first_parent {
            Some(parent) => parent == request.onto,
            None => state.is_ancestor(&request.onto, &head),
        };
        if already_there {
            return Ok(RebaseStatus::UpToDate);
        }

        if state.conflict_on.contains(&request.branch) {
            state.rebase = Some(StoppedRebase {
                branch: request.branch.clone(),
                onto: request.onto.clone(),
                commits,
                resolved: false,
            });
            return Ok(RebaseStatus::Conflict {
                files: vec![format!("{}.txt", request.branch)],
            });
        }

        let new_head = state.replay(&request.onto, &commits);
        state.branches.insert(request.branch.clone(), new_head.clone());
        Ok(RebaseStatus::Updated { new_head })
    }

    fn is_rebase_in_progress(&self) -> bool {
        self.state.borrow().rebase.is_some()
    }

    fn has_conflicts(&self) -> Result<bool> {
        Ok(matches!(&self.state.borrow().rebase, Some(r) if !r.resolved))
    }

    fn conflicted_files(&self) -> Result<Vec<String>> {
        Ok(match &self.state.borrow().rebase {
            Some(r) if !r.resolved => vec![format!("{}.txt", r.branch)],
            _ => Vec::new(),
        })
    }

    fn continue_rebase(&self, branch: &str) -> Result<RebaseStatus> {
        let mut state = self.state.borrow_mut();
        let rebase = state
            .rebase
            .take()
            .ok_or_else(|| StackwiseError::precondition("No rebase is in progress"))?;
        if rebase.branch != branch {
            return Err(StackwiseError::rebase(format!(
                "stopped rebase is for '{}', not '{branch}'",
                rebase.branch
            )));
        }
        state.log.push(format!("continue {branch}"));
        let new_head = state.replay(&rebase.onto, &rebase.commits);
        state.branches.insert(branch.to_string(), new_head.clone());
        Ok(RebaseStatus::Updated { new_head })
    }

    fn abort_rebase(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(rebase) = state.rebase.take() {
            state.log.push(format!("abort {}", rebase.branch));
        }
        Ok(())
    }

    fn force_push(&self, branch: &str) -> Result<PushOutcome> {
        let mut state = self.state.borrow_mut();
        if state.failing_pushes.contains(branch) {
            return Err(StackwiseError::push(format!("remote rejected '{branch}'")));
        }
        state.pushed.push(branch.to_string());
        state.log.push(format!("push {branch}"));
        Ok(PushOutcome::Pushed)
    }

    fn resolve_upstream_base_tip(&self, trunk: &str) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.log.push(format!("fetch {trunk}"));
        match state.upstream_tips.get(trunk) {
            Some(tip) => Ok(tip.clone()),
            None => state.head_of(trunk),
        }
    }
}
