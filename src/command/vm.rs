//! `calf vm` commands.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::style;
use std::io;
use std::time::Duration;
use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};
use tracing::debug;

use crate::config::{Config, ProviderSettings};
use crate::isolation::{CacheManager, RunOptions, TartClient, VmInfo, VmState, expand_tilde};
use crate::prompt::{self, Confirm, StdinConfirm};

#[derive(Debug, Args)]
pub struct VmArgs {
    #[command(subcommand)]
    pub command: VmCommand,
}

#[derive(Debug, Subcommand)]
pub enum VmCommand {
    /// Clone a VM from the base image and apply resource settings
    Create {
        name: String,
        /// Image to clone (defaults to the configured base image)
        #[arg(long)]
        image: Option<String>,
        /// CPU cores (defaults to config)
        #[arg(long)]
        cpu: Option<u32>,
        /// Memory in MB (defaults to config)
        #[arg(long)]
        memory: Option<u32>,
        /// Disk size in GB (defaults to config)
        #[arg(long)]
        disk_size: Option<u32>,
    },
    /// Boot a VM in the foreground
    Start {
        name: String,
        /// Run without a graphics window
        #[arg(long)]
        headless: bool,
        /// Use the built-in VNC server
        #[arg(long)]
        vnc: bool,
        /// Use the experimental VNC server
        #[arg(long)]
        vnc_experimental: bool,
        /// Additional directory shares (name:path[:ro])
        #[arg(long = "dir", value_name = "SPEC")]
        dirs: Vec<String>,
    },
    /// Stop a running VM
    Stop {
        name: String,
        /// Terminate immediately instead of waiting for a graceful shutdown
        #[arg(short, long)]
        force: bool,
    },
    /// Delete a VM
    Delete {
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List all VMs
    List,
    /// Show the state of a VM
    Status { name: String },
    /// Wait for a VM to acquire an IP address and print it
    Ip {
        name: String,
        /// Seconds to wait (0 uses the default of 60)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },
}

pub fn run(args: VmArgs) -> Result<()> {
    let mut tart = TartClient::new();
    match args.command {
        VmCommand::Create {
            name,
            image,
            cpu,
            memory,
            disk_size,
        } => {
            let settings = Config::load(Some(&name))?.settings();
            let request = CreateRequest {
                image,
                cpu,
                memory,
                disk_size,
            };
            run_create(&mut tart, &name, &settings, request)
        }
        VmCommand::Start {
            name,
            headless,
            vnc,
            vnc_experimental,
            dirs,
        } => {
            let options = RunOptions {
                headless,
                vnc,
                vnc_experimental,
                dirs,
            };
            run_start(&mut tart, &CacheManager::new(), &name, options)
        }
        VmCommand::Stop { name, force } => {
            if !tart.is_running(&name) {
                bail!("VM {} is not running", name);
            }
            tart.stop(&name, force)?;
            println!("Stopped {}", style(&name).bold());
            Ok(())
        }
        VmCommand::Delete { name, yes } => run_delete(&mut tart, &name, yes, &mut StdinConfirm),
        VmCommand::List => run_list(&mut tart),
        VmCommand::Status { name } => {
            println!("{}: {}", name, tart.state(&name));
            Ok(())
        }
        VmCommand::Ip { name, timeout } => {
            let mut tart = tart.with_output(Box::new(io::stderr()));
            let ip = tart.ip(&name, Duration::from_secs(timeout))?;
            println!("{}", ip);
            Ok(())
        }
    }
}

/// Command-line overrides for `vm create`; unset fields fall back to config.
#[derive(Debug, Default)]
struct CreateRequest {
    image: Option<String>,
    cpu: Option<u32>,
    memory: Option<u32>,
    disk_size: Option<u32>,
}

fn run_create(
    tart: &mut TartClient,
    name: &str,
    settings: &ProviderSettings,
    request: CreateRequest,
) -> Result<()> {
    if tart.exists(name) {
        bail!("VM {} already exists", name);
    }

    let image = request.image.unwrap_or_else(|| settings.base_image.clone());
    let cpu = request.cpu.unwrap_or(settings.cpu);
    let memory = request.memory.unwrap_or(settings.memory);
    let disk_size = request.disk_size.unwrap_or(settings.disk_size);

    tart.clone_vm(&image, name)?;
    tart.configure(name, cpu, memory, &disk_size.to_string())?;
    debug!(
        vm = name,
        branch_prefix = %settings.branch_prefix,
        "vm:create configured"
    );

    println!(
        "{} Created {} from {} ({} CPU, {} MB, {} GB)",
        style("✓").green(),
        style(name).bold(),
        image,
        cpu,
        memory,
        disk_size
    );
    println!("  Proxy mode: {}", settings.proxy_mode);
    println!("  Output sync: {}", settings.sync_dir);
    Ok(())
}

fn run_start(
    tart: &mut TartClient,
    cm: &CacheManager,
    name: &str,
    mut options: RunOptions,
) -> Result<()> {
    match tart.state(name) {
        VmState::NotFound => bail!("VM {} not found", name),
        VmState::Running => bail!("VM {} is already running", name),
        VmState::Stopped => {}
    }

    cm.setup_all()?;
    if cm.cache_base_dir().exists() {
        options.dirs.insert(0, cm.shared_cache_mount().to_string());
    }
    options.dirs = options
        .dirs
        .iter()
        .map(|spec| expand_dir_spec(spec))
        .collect::<Result<_>>()?;

    println!("Starting {}...", style(name).bold());
    tart.run(name, &options)
}

/// Expand `~` in the host path of a `name:path[:ro]` directory share.
fn expand_dir_spec(spec: &str) -> Result<String> {
    let Some((share, rest)) = spec.split_once(':') else {
        return Ok(expand_tilde(spec)?.display().to_string());
    };
    let (path, suffix) = match rest.strip_suffix(":ro") {
        Some(path) => (path, ":ro"),
        None => (rest, ""),
    };
    Ok(format!(
        "{}:{}{}",
        share,
        expand_tilde(path)?.display(),
        suffix
    ))
}

fn run_delete(
    tart: &mut TartClient,
    name: &str,
    yes: bool,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    if !tart.exists(name) {
        bail!("VM {} not found", name);
    }
    if tart.is_running(name) {
        bail!("VM {} is running; stop it first", name);
    }

    if !yes {
        let answer = confirm.ask(&format!("Delete VM {}? [y/N] ", name))?;
        if !answer.as_deref().is_some_and(prompt::is_explicit_yes) {
            println!("Aborted.");
            return Ok(());
        }
    }

    tart.delete(name)?;
    println!("Deleted {}", style(name).bold());
    Ok(())
}

#[derive(Tabled)]
struct VmRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "SIZE")]
    size: String,
}

impl From<VmInfo> for VmRow {
    fn from(vm: VmInfo) -> Self {
        Self {
            name: vm.name,
            state: vm.state.to_string(),
            size: vm
                .size
                .map(|gb| format!("{:.1} GB", gb))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn run_list(tart: &mut TartClient) -> Result<()> {
    let vms = tart.list()?;
    if vms.is_empty() {
        println!("No VMs found");
        return Ok(());
    }

    let rows: Vec<VmRow> = vms.into_iter().map(VmRow::from).collect();
    let mut table = Table::new(rows);
    table
        .with(Style::blank())
        .modify(Columns::new(0..3), Padding::new(0, 1, 0, 0));
    println!("{table}");
    Ok(())
}
