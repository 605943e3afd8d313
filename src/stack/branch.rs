use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship metadata for one tracked branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Version-control branch name
    pub name: String,
    /// Branch this one is stacked on; `None` for a stack root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Parent tip as of the last successful sync of this branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_synced_commit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BranchRecord {
    pub fn new(name: String, parent: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            name,
            parent,
            parent_synced_commit: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record that only stands in for an untracked parent (a trunk or a
    /// branch someone else manages). Never persisted.
    pub fn placeholder(name: &str) -> Self {
        Self::new(name.to_string(), None)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
