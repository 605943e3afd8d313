use crate::cli::Cli;
use crate::errors::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

/// Generate shell completions for the specified shell
pub fn generate_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let bin_name = "sw";

    generate(shell, &mut cmd, bin_name, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_mention_subcommands() {
        let mut cmd = Cli::command();
        let mut buffer = Vec::new();
        generate(Shell::Bash, &mut cmd, "sw", &mut buffer);

        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("sync"));
        assert!(script.contains("tree"));
    }
}
