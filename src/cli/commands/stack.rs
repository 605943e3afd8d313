use crate::cli::output::Output;
use crate::errors::{Result, StackwiseError};
use crate::stack::tree::render_forest;
use crate::stack::{
    StackManager, SyncObserver, SyncOptions, SyncOutcome, SyncReport, SyncStatus,
};
use crate::utils::spinner::Spinner;
use clap::Subcommand;
use console::{style, Term};
use std::env;

#[derive(Debug, Subcommand)]
pub enum StackAction {
    /// Create a new stacked branch on top of the current branch
    Branch {
        /// Name of the new branch
        name: String,
        /// Parent branch to stack on (defaults to the current branch)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Rebase the current stack onto up-to-date parents
    Sync {
        /// Make this branch the parent of the current branch first
        #[arg(long)]
        parent: Option<String>,
        /// Only sync the current branch (don't recurse into descendants)
        #[arg(long)]
        current: bool,
        /// Pull the latest upstream trunk into the stack
        #[arg(long)]
        trunk: bool,
        /// Do not force-push updated branches
        #[arg(long)]
        no_push: bool,
        /// Continue a sync halted on a conflict
        #[arg(
            long = "continue",
            conflicts_with_all = ["parent", "current", "trunk", "no_push", "abort"]
        )]
        continue_sync: bool,
        /// Abandon a sync halted on a conflict
        #[arg(long, conflicts_with_all = ["parent", "current", "trunk", "no_push"])]
        abort: bool,
    },

    /// Show all stacks as a tree
    Tree,

    /// Check out the branch N levels up the stack
    Next {
        /// Number of branches to move
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i64,
        /// Sync the branch with its parent after moving
        #[arg(long)]
        sync: bool,
    },

    /// Check out the branch N levels down the stack
    Prev {
        /// Number of branches to move
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i64,
    },
}

pub fn run(action: StackAction) -> Result<()> {
    let current_dir = env::current_dir()
        .map_err(|e| StackwiseError::config(format!("Could not get current directory: {e}")))?;
    let manager = StackManager::new(&current_dir)?;

    match action {
        StackAction::Branch { name, parent } => create_branch(&manager, &name, parent.as_deref()),
        StackAction::Sync {
            parent,
            current,
            trunk,
            no_push,
            continue_sync,
            abort,
        } => {
            if abort {
                abort_sync(&manager)
            } else if continue_sync {
                let mut reporter = ProgressReporter::new();
                let report = manager.continue_sync(&mut reporter)?;
                finish_sync(&report);
                Ok(())
            } else {
                let options = SyncOptions {
                    current_only: current,
                    trunk,
                    no_push,
                    parent_override: parent,
                };
                sync_stack(&manager, &options)
            }
        }
        StackAction::Tree => show_tree(&manager),
        StackAction::Next { n, sync } => {
            let target = manager.next(n)?;
            Output::success(format!("Switched to {}", style(&target).cyan()));
            if sync {
                let options = SyncOptions {
                    current_only: true,
                    ..SyncOptions::default()
                };
                sync_stack(&manager, &options)?;
            }
            Ok(())
        }
        StackAction::Prev { n } => {
            let target = manager.prev(n)?;
            Output::success(format!("Switched to {}", style(&target).cyan()));
            Ok(())
        }
    }
}

fn create_branch(manager: &StackManager, name: &str, parent: Option<&str>) -> Result<()> {
    let record = manager.create_branch(name, parent)?;

    Output::success(format!("Created branch {}", style(&record.name).cyan()));
    if let Some(parent) = &record.parent {
        Output::sub_item(format!("Stacked on {parent}"));
    }
    Ok(())
}

fn sync_stack(manager: &StackManager, options: &SyncOptions) -> Result<()> {
    let mut reporter = ProgressReporter::new();
    let report = manager.sync(options, &mut reporter)?;
    finish_sync(&report);
    Ok(())
}

fn abort_sync(manager: &StackManager) -> Result<()> {
    let pending = manager.abort_sync()?;
    Output::success(format!(
        "Aborted sync of {}",
        style(&pending.conflicted_branch).cyan()
    ));
    Output::sub_item(format!("Back on {}", pending.original_branch));
    Ok(())
}

fn show_tree(manager: &StackManager) -> Result<()> {
    let forest = manager.forest()?;
    if forest.is_empty() {
        Output::info("No stacked branches yet");
        Output::command_example("sw stack branch <name>");
        return Ok(());
    }

    print!("{}", render_forest(&forest));
    Ok(())
}

/// Closing summary, with resolution instructions after a conflict
fn finish_sync(report: &SyncReport) {
    let Some(conflict) = report.conflict() else {
        Output::success(format!(
            "Stack synced: {} of {} branch(es) updated",
            report.updated_count(),
            report.outcomes.len()
        ));
        return;
    };

    println!();
    Output::warning(format!(
        "Sync stopped at {} (rebasing onto {})",
        style(&conflict.branch).cyan(),
        conflict.parent
    ));
    if !report.remaining.is_empty() {
        Output::sub_item(format!("Still to sync: {}", report.remaining.join(", ")));
    }
    Output::tip("To resolve:");
    Output::numbered_item(1, "Fix the conflicted files");
    Output::numbered_item(2, "Stage them with `git add`");
    Output::numbered_item(3, "Resume the sync:");
    Output::command_example("sw stack sync --continue");
    Output::tip("Or give up and restore the original branch:");
    Output::command_example("sw stack sync --abort");
}

fn print_outcome(outcome: &SyncOutcome) {
    match &outcome.status {
        SyncStatus::AlreadyUpToDate => Output::info(format!(
            "{} is already up to date with {}",
            style(&outcome.branch).cyan(),
            outcome.parent
        )),
        SyncStatus::Updated { pushed, .. } => {
            Output::success(format!(
                "Rebased {} onto {}",
                style(&outcome.branch).cyan(),
                outcome.parent
            ));
            if *pushed {
                Output::sub_item("Force-pushed");
            }
        }
        SyncStatus::Conflict { files } => {
            Output::error(format!(
                "Conflict rebasing {} onto {}",
                style(&outcome.branch).cyan(),
                outcome.parent
            ));
            for file in files {
                Output::sub_item(file);
            }
        }
    }
}

/// Shows a spinner while each branch syncs, then its outcome line
struct ProgressReporter {
    interactive: bool,
    spinner: Option<Spinner>,
}

impl ProgressReporter {
    fn new() -> Self {
        Self {
            interactive: Term::stdout().is_term(),
            spinner: None,
        }
    }
}

impl SyncObserver for ProgressReporter {
    fn step_started(&mut self, branch: &str, parent: &str) {
        self.spinner = Some(if self.interactive {
            Spinner::new(format!("Syncing {branch} onto {parent}"))
        } else {
            Spinner::hidden()
        });
    }

    fn step_finished(&mut self, outcome: &SyncOutcome) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop();
        }
        print_outcome(outcome);
    }
}
