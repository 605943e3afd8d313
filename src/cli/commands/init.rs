use crate::cli::output::Output;
use crate::config::{detect_trunk_branch, initialize_repo, is_repo_initialized, Settings};
use crate::errors::Result;
use crate::git::{get_current_repository, VersionControl};

/// Write the repository configuration
pub fn run(trunk: Option<String>, remote: Option<String>, force: bool) -> Result<()> {
    let repo = get_current_repository()?;
    let common_dir = repo.common_dir().to_path_buf();

    if force && is_repo_initialized(&common_dir) {
        tracing::warn!("Overwriting existing stackwise configuration");
    }

    let trunk = trunk.unwrap_or_else(|| detect_trunk_branch(&repo));
    let mut settings = Settings::default_for_repo(Some(trunk.clone()));
    if let Some(remote) = remote {
        settings.git.remote = remote;
    }

    let path = initialize_repo(&common_dir, &settings, force)?;

    Output::success("Stackwise initialized");
    Output::sub_item(format!("Trunk branch: {}", settings.git.trunk_branch));
    Output::sub_item(format!("Remote: {}", settings.git.remote));
    Output::sub_item(format!("Config: {}", path.display()));

    if !repo.branch_exists(&trunk) {
        Output::warning(format!("Trunk branch '{trunk}' does not exist yet"));
    }

    println!();
    Output::tip("Create your first stacked branch:");
    Output::command_example("sw stack branch my-feature");

    Ok(())
}
