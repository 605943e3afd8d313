use crate::errors::{Result, StackwiseError};
use crate::git::VersionControl;
use crate::stack::branch::BranchRecord;
use crate::stack::store::RelationshipStore;
use tracing::info;

/// Create `name` at the current commit, stacked on `parent_override` or the
/// checked-out branch, and check it out.
///
/// The parent's current tip becomes the initial watermark, so the first sync
/// only replays commits made on the new branch.
pub fn create_branch(
    vcs: &dyn VersionControl,
    store: &RelationshipStore,
    name: &str,
    parent_override: Option<&str>,
) -> Result<BranchRecord> {
    if name.is_empty() || !git2::Reference::is_valid_name(&format!("refs/heads/{name}")) {
        return Err(StackwiseError::validation(format!(
            "'{name}' is not a valid branch name"
        )));
    }

    let parent = match parent_override {
        Some(parent) => parent.to_string(),
        None => vcs.current_branch_name()?,
    };

    if vcs.branch_exists(name) {
        return Err(StackwiseError::validation(format!(
            "Branch '{name}' already exists"
        )));
    }
    if store.get(name)?.is_some() {
        return Err(StackwiseError::validation(format!(
            "Branch '{name}' already has a stack record"
        )));
    }
    if !store.is_trunk(&parent) && store.get(&parent)?.is_none() {
        return Err(StackwiseError::not_found(format!(
            "Parent '{parent}' is not part of a stack; use a trunk branch or a branch created with `sw stack branch`"
        )));
    }
    let parent_tip = vcs.branch_head(&parent).map_err(|e| {
        StackwiseError::not_found(format!("Parent branch '{parent}' does not exist: {e}"))
    })?;

    vcs.create_branch(name)
        .map_err(|e| StackwiseError::on_branch("create", name, e))?;
    store.set_parent(name, &parent)?;
    store.record_synced_parent_commit(name, &parent_tip)?;
    vcs.checkout_branch(name)
        .map_err(|e| StackwiseError::on_branch("checkout", name, e))?;

    info!("Created '{}' stacked on '{}'", name, parent);
    store.require(name)
}
