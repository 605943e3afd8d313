use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{get_repo_config_path, load_settings, Settings};
use crate::errors::Result;
use crate::git::get_current_repository;
use console::style;

/// Handle configuration commands
pub fn run(action: ConfigAction) -> Result<()> {
    let repo = get_current_repository()?;
    let common_dir = repo.common_dir().to_path_buf();
    let settings = load_settings(&common_dir, &repo)?;

    match action {
        ConfigAction::Set { key, value } => {
            let config_file = get_repo_config_path(&common_dir);
            set_config_value(settings, &config_file, &key, &value)
        }
        ConfigAction::Get { key } => {
            println!("{}", settings.get_value(&key)?);
            Ok(())
        }
        ConfigAction::List => {
            for (key, value) in settings.entries() {
                println!("{} = {}", style(key).cyan(), value);
            }
            Ok(())
        }
    }
}

/// Update one key and write the repository configuration
fn set_config_value(
    mut settings: Settings,
    config_file: &std::path::Path,
    key: &str,
    value: &str,
) -> Result<()> {
    settings.set_value(key, value)?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {value}"));

    if key == "git.trunk_branch" {
        Output::tip("Existing stacks rooted on the old trunk keep their parent until re-parented:");
        Output::command_example("sw stack sync --parent <trunk>");
    }

    Ok(())
}
