use crate::command;
use crate::command::cache::CacheArgs;
use crate::command::config::ConfigArgs;
use crate::command::vm::VmArgs;
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "calf")]
#[command(about = "Run coding agents in isolated Tart VMs with shared package caches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the host package caches shared with VMs
    Cache(CacheArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Create, start, and manage Tart VMs
    Vm(VmArgs),

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Cache(args) => command::cache::run(args),
        Commands::Config(args) => command::config::run(args),
        Commands::Vm(args) => command::vm::run(args),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_cache_clear_flags() {
        let cli = Cli::try_parse_from([
            "calf", "cache", "clear", "--dry-run", "--type", "npm", "--type", "GO",
        ])
        .unwrap();
        let Commands::Cache(args) = cli.command else {
            panic!("expected cache command");
        };
        let command::cache::CacheCommand::Clear {
            all,
            dry_run,
            types,
        } = args.command
        else {
            panic!("expected clear");
        };
        assert!(!all);
        assert!(dry_run);
        assert_eq!(
            types,
            vec![crate::isolation::CacheType::Npm, crate::isolation::CacheType::Go]
        );
    }

    #[test]
    fn rejects_unknown_cache_type() {
        assert!(Cli::try_parse_from(["calf", "cache", "clear", "--type", "pip"]).is_err());
    }

    #[test]
    fn parses_vm_start_dirs() {
        let cli = Cli::try_parse_from([
            "calf", "vm", "start", "agent-1", "--headless", "--dir", "src:~/src",
        ])
        .unwrap();
        let Commands::Vm(args) = cli.command else {
            panic!("expected vm command");
        };
        let command::vm::VmCommand::Start {
            name,
            headless,
            dirs,
            ..
        } = args.command
        else {
            panic!("expected start");
        };
        assert_eq!(name, "agent-1");
        assert!(headless);
        assert_eq!(dirs, vec!["src:~/src"]);
    }
}
