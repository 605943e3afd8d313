pub mod settings;

pub use settings::{GitConfig, Settings, SyncSettings};

use crate::errors::{Result, StackwiseError};
use crate::git::VersionControl;
use std::path::{Path, PathBuf};

const STATE_DIR: &str = "stackwise";
const CONFIG_FILE: &str = "config.json";

/// Get the user-level configuration directory (~/.stackwise/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| StackwiseError::config("Could not find home directory"))?;
    Ok(home_dir.join(".stackwise"))
}

/// Directory holding a repository's stack data, shared by all its worktrees
pub fn get_repo_state_dir(common_git_dir: &Path) -> PathBuf {
    common_git_dir.join(STATE_DIR)
}

pub fn get_repo_config_path(common_git_dir: &Path) -> PathBuf {
    get_repo_state_dir(common_git_dir).join(CONFIG_FILE)
}

/// Check if a repository has its own configuration
pub fn is_repo_initialized(common_git_dir: &Path) -> bool {
    get_repo_config_path(common_git_dir).exists()
}

/// `main` if it exists, else `master`, else `main`
pub fn detect_trunk_branch(vcs: &dyn VersionControl) -> String {
    ["main", "master"]
        .into_iter()
        .find(|name| vcs.branch_exists(name))
        .unwrap_or("main")
        .to_string()
}

/// Resolve settings: repository config, then the user config, then defaults
/// with a detected trunk branch
pub fn load_settings(common_git_dir: &Path, vcs: &dyn VersionControl) -> Result<Settings> {
    if let Some(settings) = Settings::load_from_file(&get_repo_config_path(common_git_dir))? {
        return Ok(settings);
    }

    if let Ok(global_dir) = get_config_dir() {
        if let Some(settings) = Settings::load_from_file(&global_dir.join(CONFIG_FILE))? {
            tracing::debug!("Using user configuration from {}", global_dir.display());
            return Ok(settings);
        }
    }

    Ok(Settings::default_for_repo(Some(detect_trunk_branch(vcs))))
}

/// Write the repository configuration, refusing to overwrite without `force`
pub fn initialize_repo(common_git_dir: &Path, settings: &Settings, force: bool) -> Result<PathBuf> {
    let path = get_repo_config_path(common_git_dir);
    if path.exists() && !force {
        return Err(StackwiseError::precondition(format!(
            "Repository is already initialized ({}); use --force to overwrite",
            path.display()
        )));
    }

    settings.save_to_file(&path)?;
    tracing::info!("Initialized stackwise configuration at {}", path.display());
    Ok(path)
}
