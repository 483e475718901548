use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_DIR: &str = "calf";
const LOG_FILE: &str = "calf.log";

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init() -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    init_inner()?;
    let _ = INIT.set(());
    Ok(())
}

fn init_inner() -> Result<()> {
    let log_path = determine_log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }

    let (directory, file_name) = split_path(&log_path)?;
    let file_appender = rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // The writer thread lives as long as the guard
    let _ = GUARD.set(guard);

    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

fn determine_log_path() -> Result<PathBuf> {
    let state_home = std::env::var("XDG_STATE_HOME").ok();
    if let Some(path) = log_path_for(state_home.as_deref(), home::home_dir().as_deref()) {
        return Ok(path);
    }

    // Fallback to current directory if home cannot be determined
    Ok(std::env::current_dir()?.join(LOG_FILE))
}

/// Log location from `XDG_STATE_HOME` and the home directory, if either is usable.
fn log_path_for(state_home: Option<&str>, home_dir: Option<&Path>) -> Option<PathBuf> {
    // XDG_STATE_HOME wins when set to something non-empty
    if let Some(state_home) = state_home
        && !state_home.is_empty()
    {
        return Some(PathBuf::from(state_home).join(LOG_DIR).join(LOG_FILE));
    }

    // XDG default: ~/.local/state/calf/calf.log
    home_dir.map(|home| {
        home.join(".local")
            .join("state")
            .join(LOG_DIR)
            .join(LOG_FILE)
    })
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name"))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
