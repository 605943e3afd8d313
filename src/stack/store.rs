use crate::errors::{Result, StackwiseError};
use crate::stack::branch::BranchRecord;
use crate::utils::atomic_file;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STORE_FILE: &str = "branches.json";
const FORMAT_VERSION: u32 = 1;

/// On-disk layout of the store. `branches` is kept in insertion order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    branches: Vec<BranchRecord>,
}

/// Persistent parent/child relationships between branches.
///
/// Every call goes to disk: reads load the whole file, mutations are a single
/// locked read-modify-write, so two `sw` processes never lose each other's
/// updates and nothing is cached between operations.
#[derive(Debug, Clone)]
pub struct RelationshipStore {
    path: PathBuf,
    trunk_branches: Vec<String>,
}

impl RelationshipStore {
    /// Open the store kept in `dir`. Branches named in `trunk_branches` are
    /// valid parents without being tracked themselves.
    pub fn open(dir: &Path, trunk_branches: Vec<String>) -> Self {
        Self {
            path: dir.join(STORE_FILE),
            trunk_branches,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_trunk(&self, name: &str) -> bool {
        self.trunk_branches.iter().any(|t| t == name)
    }

    /// All records in insertion order
    pub fn records(&self) -> Result<Vec<BranchRecord>> {
        Ok(self.load()?.branches)
    }

    pub fn get(&self, name: &str) -> Result<Option<BranchRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.name == name))
    }

    /// Like [`get`](Self::get), but a missing record is an error
    pub fn require(&self, name: &str) -> Result<BranchRecord> {
        self.get(name)?
            .ok_or_else(|| StackwiseError::not_found(format!("Branch '{name}' is not tracked")))
    }

    pub fn list_all(&self) -> Result<Vec<String>> {
        Ok(self.records()?.into_iter().map(|r| r.name).collect())
    }

    /// Record `parent` as the parent of `branch`, creating the record if needed.
    ///
    /// Rejects parents that are neither tracked nor a trunk, trunks being
    /// given a parent, and anything that would make `branch` its own ancestor.
    pub fn set_parent(&self, branch: &str, parent: &str) -> Result<()> {
        if self.is_trunk(branch) {
            return Err(StackwiseError::validation(format!(
                "'{branch}' is a trunk branch and cannot be stacked on another branch"
            )));
        }
        if branch == parent {
            return Err(StackwiseError::structural(format!(
                "Branch '{branch}' cannot be its own parent"
            )));
        }

        self.update(|branches| {
            if !self.is_trunk(parent) && !branches.iter().any(|r| r.name == parent) {
                return Err(StackwiseError::not_found(format!(
                    "Parent '{parent}' is neither tracked nor a trunk branch"
                )));
            }

            // Walk up from the new parent; meeting `branch` means a cycle
            let mut seen = HashSet::new();
            let mut cursor = Some(parent.to_string());
            while let Some(name) = cursor {
                if name == branch {
                    return Err(StackwiseError::structural(format!(
                        "Making '{parent}' the parent of '{branch}' would create a cycle"
                    )));
                }
                if !seen.insert(name.clone()) {
                    return Err(StackwiseError::structural(format!(
                        "Existing parent chain above '{parent}' loops back on '{name}'"
                    )));
                }
                cursor = branches
                    .iter()
                    .find(|r| r.name == name)
                    .and_then(|r| r.parent.clone());
            }

            match branches.iter_mut().find(|r| r.name == branch) {
                Some(record) => {
                    debug!(
                        "Re-parenting '{}' from {:?} to '{}'",
                        branch, record.parent, parent
                    );
                    record.parent = Some(parent.to_string());
                    record.touch();
                }
                None => {
                    info!("Tracking '{}' on top of '{}'", branch, parent);
                    branches.push(BranchRecord::new(
                        branch.to_string(),
                        Some(parent.to_string()),
                    ));
                }
            }
            Ok(())
        })
    }

    /// Update the watermark used to detect no-op syncs
    pub fn record_synced_parent_commit(&self, branch: &str, commit: &str) -> Result<()> {
        self.update(|branches| {
            let record = branches
                .iter_mut()
                .find(|r| r.name == branch)
                .ok_or_else(|| {
                    StackwiseError::not_found(format!("Branch '{branch}' is not tracked"))
                })?;
            record.parent_synced_commit = Some(commit.to_string());
            record.touch();
            debug!("Recorded watermark {} for '{}'", commit, branch);
            Ok(())
        })
    }

    /// Put `branch` back the way an earlier [`get`](Self::get) saw it: the
    /// saved record in its original position, or no record at all
    pub fn restore(&self, branch: &str, previous: Option<BranchRecord>) -> Result<()> {
        self.update(|branches| {
            let position = branches.iter().position(|r| r.name == branch);
            match (position, previous) {
                (Some(index), Some(record)) => branches[index] = record,
                (Some(index), None) => {
                    branches.remove(index);
                }
                (None, Some(record)) => branches.push(record),
                (None, None) => {}
            }
            Ok(())
        })
    }

    fn load(&self) -> Result<StoreFile> {
        let file: StoreFile = atomic_file::read_json(&self.path)?.unwrap_or_default();
        if file.version > FORMAT_VERSION {
            return Err(StackwiseError::config(format!(
                "{} was written by a newer version (format {}, supported {})",
                self.path.display(),
                file.version,
                FORMAT_VERSION
            )));
        }
        Ok(file)
    }

    fn update<R>(&self, mutate: impl FnOnce(&mut Vec<BranchRecord>) -> Result<R>) -> Result<R> {
        atomic_file::update_json(&self.path, |file: &mut StoreFile| {
            if file.version > FORMAT_VERSION {
                return Err(StackwiseError::config(format!(
                    "{} was written by a newer version (format {})",
                    self.path.display(),
                    file.version
                )));
            }
            file.version = FORMAT_VERSION;
            mutate(&mut file.branches)
        })
    }
}
