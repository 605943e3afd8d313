use crate::errors::{Result, StackwiseError};
use crate::stack::branch::BranchRecord;
use crate::stack::store::RelationshipStore;
use std::collections::HashSet;

/// One branch and the branches stacked directly on it. Built fresh from the
/// store for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub branch: BranchRecord,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        &self.branch.name
    }

    /// Locate `name` in this subtree
    pub fn find(&self, name: &str) -> Option<&TreeNode> {
        if self.name() == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Every node below this one, parents before children, siblings in
    /// insertion order
    pub fn descendants(&self) -> Vec<&TreeNode> {
        let mut nodes = Vec::new();
        for child in &self.children {
            nodes.push(child);
            nodes.extend(child.descendants());
        }
        nodes
    }
}

/// Assemble every tracked branch into a forest.
///
/// Parentless records become roots, and so does every untracked parent name
/// (typically the trunk), as a placeholder node. Roots and children keep the
/// store's insertion order.
pub fn build_forest(store: &RelationshipStore) -> Result<Vec<TreeNode>> {
    let records = store.records()?;
    let tracked: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();

    let mut roots = Vec::new();
    let mut placeholders: HashSet<&str> = HashSet::new();
    for record in &records {
        match record.parent.as_deref() {
            None => roots.push(attach_children(record.clone(), &records)),
            Some(parent) if !tracked.contains(parent) => {
                if placeholders.insert(parent) {
                    roots.push(attach_children(BranchRecord::placeholder(parent), &records));
                }
            }
            Some(_) => {}
        }
    }

    // Anything a root cannot reach sits on a parent cycle
    let reached: HashSet<&str> = roots
        .iter()
        .flat_map(|root| root.descendants())
        .map(|node| node.name())
        .chain(roots.iter().map(|root| root.name()))
        .collect();
    let orphans: Vec<&str> = records
        .iter()
        .map(|r| r.name.as_str())
        .filter(|name| !reached.contains(name))
        .collect();
    if !orphans.is_empty() {
        return Err(StackwiseError::structural(format!(
            "Parent relationships form a cycle through: {}",
            orphans.join(", ")
        )));
    }

    Ok(roots)
}

fn attach_children(branch: BranchRecord, records: &[BranchRecord]) -> TreeNode {
    let children = records
        .iter()
        .filter(|r| r.parent.as_deref() == Some(branch.name.as_str()))
        .map(|r| attach_children(r.clone(), records))
        .collect();
    TreeNode { branch, children }
}

/// The root of the stack containing `current`.
///
/// A trunk with nothing stacked on it yields an empty root rather than an
/// error.
pub fn current_root(store: &RelationshipStore, current: &str) -> Result<TreeNode> {
    let forest = build_forest(store)?;
    if let Some(root) = forest.into_iter().find(|root| root.find(current).is_some()) {
        return Ok(root);
    }

    if store.is_trunk(current) {
        return Ok(TreeNode {
            branch: BranchRecord::placeholder(current),
            children: Vec::new(),
        });
    }

    Err(StackwiseError::not_found(format!(
        "Branch '{current}' is not tracked; create it with `sw stack branch` or sync it with `--parent`"
    )))
}

/// Render a tree as one line per branch, four spaces of indent per level
pub fn render(root: &TreeNode) -> String {
    let mut out = String::new();
    render_into(root, 0, &mut out);
    out
}

pub fn render_forest(roots: &[TreeNode]) -> String {
    roots.iter().map(render).collect()
}

fn render_into(node: &TreeNode, depth: usize, out: &mut String) {
    out.push_str(&" ".repeat(depth * 4));
    out.push_str(node.name());
    out.push('\n');
    for child in &node.children {
        render_into(child, depth + 1, out);
    }
}
