use crate::errors::{Result, StackwiseError};
use crate::git::VersionControl;
use crate::stack::store::RelationshipStore;
use crate::stack::tree::current_root;
use tracing::debug;

fn validate_count(n: i64) -> Result<usize> {
    usize::try_from(n)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| StackwiseError::validation(format!("Invalid number of branches to move: {n}")))
}

/// Check out the branch `n` levels above the current one.
///
/// Refuses when a branch on the way has several children, since the
/// direction is ambiguous there.
pub fn next_branch(vcs: &dyn VersionControl, store: &RelationshipStore, n: i64) -> Result<String> {
    let steps = validate_count(n)?;
    let current = vcs.current_branch_name()?;
    let root = current_root(store, &current)?;

    let mut node = root
        .find(&current)
        .ok_or_else(|| StackwiseError::not_found(format!("Branch '{current}' is not tracked")))?;
    for _ in 0..steps {
        node = match node.children.as_slice() {
            [] if node.name() == current => {
                return Err(StackwiseError::precondition(format!(
                    "'{current}' is at the top of its stack"
                )))
            }
            [] => {
                return Err(StackwiseError::precondition(format!(
                    "Stack ends at '{}', fewer than {steps} branches above '{current}'",
                    node.name()
                )))
            }
            [only] => only,
            several => {
                let names: Vec<&str> = several.iter().map(|c| c.name()).collect();
                return Err(StackwiseError::precondition(format!(
                    "'{}' has several children ({}); check one out directly",
                    node.name(),
                    names.join(", ")
                )));
            }
        };
    }

    let target = node.name().to_string();
    checkout(vcs, &target)?;
    Ok(target)
}

/// Check out the branch `n` levels below the current one. The trunk a stack
/// hangs from is a valid destination.
pub fn prev_branch(vcs: &dyn VersionControl, store: &RelationshipStore, n: i64) -> Result<String> {
    let steps = validate_count(n)?;
    let current = vcs.current_branch_name()?;
    if store.get(&current)?.is_none() && !store.is_trunk(&current) {
        return Err(StackwiseError::not_found(format!(
            "Branch '{current}' is not tracked"
        )));
    }

    let mut target = current.clone();
    for _ in 0..steps {
        let parent = store.get(&target)?.and_then(|record| record.parent);
        target = match parent {
            Some(parent) => parent,
            None if target == current => {
                return Err(StackwiseError::precondition(format!(
                    "'{current}' is at the bottom of its stack"
                )))
            }
            None => {
                return Err(StackwiseError::precondition(format!(
                    "Stack starts at '{target}', fewer than {steps} branches below '{current}'"
                )))
            }
        };
    }

    checkout(vcs, &target)?;
    Ok(target)
}

fn checkout(vcs: &dyn VersionControl, target: &str) -> Result<()> {
    debug!("Moving to '{}'", target);
    vcs.checkout_branch(target)
        .map_err(|e| StackwiseError::on_branch("checkout", target, e))
}
