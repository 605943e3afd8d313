pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::stack::StackAction;

#[derive(Parser)]
#[command(name = "sw")]
#[command(about = "Stackwise - manage and sync stacked branches")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write repository configuration
    Init {
        /// Trunk branch stacks are rooted on (detected when omitted)
        #[arg(long)]
        trunk: Option<String>,

        /// Remote to fetch the trunk from and push branches to
        #[arg(long)]
        remote: Option<String>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Stack management
    Stack {
        #[command(subcommand)]
        action: StackAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., git.trunk_branch)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        // Set up logging based on verbosity
        self.setup_logging();

        match self.command {
            Commands::Init {
                trunk,
                remote,
                force,
            } => commands::init::run(trunk, remote, force),
            Commands::Config { action } => commands::config::run(action),
            Commands::Stack { action } => commands::stack::run(action),
            Commands::Completions { shell } => commands::completions::generate_completions(shell),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .without_time();

        if self.no_color {
            console::set_colors_enabled(false);
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
