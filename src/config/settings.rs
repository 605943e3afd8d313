use crate::errors::{Result, StackwiseError};
use crate::utils::atomic_file;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub git: GitConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Integration branch stacks are rooted on
    pub trunk_branch: String,
    /// Remote that trunk updates are fetched from and branches are pushed to
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Force-push branches a sync rewrote
    pub push: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            trunk_branch: "main".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { push: true }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 3] = ["git.trunk_branch", "git.remote", "sync.push"];

    /// Create default settings for a repository
    pub fn default_for_repo(trunk_branch: Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(trunk) = trunk_branch {
            settings.git.trunk_branch = trunk;
        }
        settings
    }

    /// Load settings from a file, or `None` if there is no such file
    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        atomic_file::read_json(path)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        atomic_file::write_json(path, self)
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "git.trunk_branch" => self.git.trunk_branch = value.to_string(),
            "git.remote" => self.git.remote = value.to_string(),
            "sync.push" => {
                self.sync.push = value.parse().map_err(|_| {
                    StackwiseError::validation(format!("Invalid boolean value: {value}"))
                })?;
            }
            _ => {
                return Err(StackwiseError::validation(format!(
                    "Unknown config key: {key} (known keys: {})",
                    Self::KEYS.join(", ")
                )))
            }
        }

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "git.trunk_branch" => self.git.trunk_branch.clone(),
            "git.remote" => self.git.remote.clone(),
            "sync.push" => self.sync.push.to_string(),
            _ => {
                return Err(StackwiseError::validation(format!(
                    "Unknown config key: {key}"
                )))
            }
        };

        Ok(value)
    }

    /// Every key with its current value
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get_value(key).ok().map(|value| (*key, value)))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.git.trunk_branch.trim().is_empty() {
            return Err(StackwiseError::validation("git.trunk_branch must not be empty"));
        }
        if !git2::Reference::is_valid_name(&format!("refs/heads/{}", self.git.trunk_branch)) {
            return Err(StackwiseError::validation(format!(
                "git.trunk_branch '{}' is not a valid branch name",
                self.git.trunk_branch
            )));
        }
        if self.git.remote.trim().is_empty() {
            return Err(StackwiseError::validation("git.remote must not be empty"));
        }

        Ok(())
    }
}
