//! `calf config` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use std::io::{self, Write};

use crate::config::Config;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show {
        /// VM name to include the per-VM config for
        #[arg(long, short)]
        vm: Option<String>,
    },
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show { vm } => {
            let config = Config::load(vm.as_deref())?;
            render(&config, vm.as_deref(), &mut io::stdout())
        }
    }
}

fn render<W: Write>(config: &Config, vm: Option<&str>, w: &mut W) -> Result<()> {
    let d = &config.isolation.defaults;

    writeln!(w, "{}", style("CALF Configuration").bold())?;
    writeln!(w, "==================")?;
    writeln!(w, "Version: {}", config.version)?;
    writeln!(w)?;

    writeln!(w, "VM Defaults:")?;
    writeln!(w, "  CPU: {} cores", d.vm.cpu)?;
    writeln!(w, "  Memory: {} MB", d.vm.memory)?;
    writeln!(w, "  Disk Size: {} GB", d.vm.disk_size)?;
    writeln!(w, "  Base Image: {}", d.vm.base_image)?;
    writeln!(w)?;

    writeln!(w, "GitHub:")?;
    writeln!(w, "  Default Branch Prefix: {}", d.github.default_branch_prefix)?;
    writeln!(w)?;

    writeln!(w, "Output:")?;
    writeln!(w, "  Sync Directory: {}", d.output.sync_dir)?;
    writeln!(w)?;

    writeln!(w, "Proxy:")?;
    writeln!(w, "  Mode: {}", d.proxy.mode)?;
    writeln!(w)?;

    match vm {
        Some(name) => writeln!(w, "(Showing config for VM: {})", name)?,
        None => writeln!(w, "(Showing global config)")?,
    }
    Ok(())
}
