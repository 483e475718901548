//! Layered VM configuration.
//!
//! Precedence: hard-coded defaults, then `~/.calf/config.yaml`, then the
//! per-VM file `~/.calf/isolation/vms/<name>/vm.yaml`.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::isolation::IsolationError;

const MIN_CPU: u32 = 1;
const MAX_CPU: u32 = 32;
const MIN_MEMORY_MB: u32 = 256;
const MAX_MEMORY_MB: u32 = 65536;
const MIN_DISK_GB: u32 = 10;
const MAX_DISK_GB: u32 = 500;

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub version: u32,
    pub isolation: IsolationConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationConfig {
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsConfig {
    pub vm: VmConfig,
    pub github: GitHubConfig,
    pub output: OutputConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// CPU cores
    pub cpu: u32,
    /// Memory in MB
    pub memory: u32,
    /// Disk size in GB
    pub disk_size: u32,
    pub base_image: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitHubConfig {
    pub default_branch_prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub sync_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// One of `auto`, `on`, `off`.
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    Auto,
    On,
    Off,
}

impl ProxyMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ProxyMode::Auto),
            "on" => Some(ProxyMode::On),
            "off" => Some(ProxyMode::Off),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyMode::Auto => "auto",
            ProxyMode::On => "on",
            ProxyMode::Off => "off",
        })
    }
}

/// The values VM operations consume, passed explicitly instead of through
/// shared command-line state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub cpu: u32,
    pub memory: u32,
    pub disk_size: u32,
    pub base_image: String,
    pub proxy_mode: ProxyMode,
    pub branch_prefix: String,
    pub sync_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            isolation: IsolationConfig {
                defaults: DefaultsConfig {
                    vm: VmConfig {
                        cpu: 4,
                        memory: 8192,
                        disk_size: 80,
                        base_image: "ghcr.io/cirruslabs/macos-sequoia-base:latest".to_string(),
                    },
                    github: GitHubConfig {
                        default_branch_prefix: "agent/".to_string(),
                    },
                    output: OutputConfig {
                        sync_dir: "~/calf-output".to_string(),
                    },
                    proxy: ProxyConfig {
                        mode: "auto".to_string(),
                    },
                },
            },
        }
    }
}

// Partial file schemas: every field optional so absent keys keep the lower layer.

#[derive(Debug, Deserialize, Default)]
struct GlobalFile {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    isolation: Option<GlobalIsolation>,
}

#[derive(Debug, Deserialize, Default)]
struct GlobalIsolation {
    #[serde(default)]
    defaults: Option<GlobalDefaults>,
}

#[derive(Debug, Deserialize, Default)]
struct GlobalDefaults {
    #[serde(default)]
    vm: Option<VmFile>,
    #[serde(default)]
    github: Option<GitHubFile>,
    #[serde(default)]
    output: Option<OutputFile>,
    #[serde(default)]
    proxy: Option<ProxyFile>,
}

#[derive(Debug, Deserialize, Default)]
struct VmFile {
    cpu: Option<u32>,
    memory: Option<u32>,
    disk_size: Option<u32>,
    base_image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GitHubFile {
    default_branch_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputFile {
    sync_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ProxyFile {
    mode: Option<String>,
}

impl Config {
    /// Load from the default locations, including the per-VM file when a VM
    /// name is given.
    pub fn load(vm_name: Option<&str>) -> Result<Self> {
        let global = global_config_path()?;
        let vm = vm_name.map(vm_config_path).transpose()?;
        Self::load_from(Some(&global), vm.as_deref())
    }

    /// Merge the given files over the defaults and validate the result.
    /// Missing files are skipped; unreadable or malformed files are errors.
    pub fn load_from(global_path: Option<&Path>, vm_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = global_path
            && let Some(contents) = read_optional(path)?
        {
            let file: GlobalFile = serde_yaml::from_str(&contents)
                .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
            config.merge_global(file);
        }

        if let Some(path) = vm_path
            && let Some(contents) = read_optional(path)?
        {
            let file: VmFile = serde_yaml::from_str(&contents).map_err(|e| {
                anyhow!("Failed to parse VM config file '{}': {}", path.display(), e)
            })?;
            config.merge_vm(file);
        }

        // Errors name the most specific file consulted.
        let validation_path = vm_path.or(global_path);
        config.validate(validation_path)?;

        debug!(
            cpu = config.isolation.defaults.vm.cpu,
            memory = config.isolation.defaults.vm.memory,
            disk_size = config.isolation.defaults.vm.disk_size,
            "config:loaded"
        );
        Ok(config)
    }

    fn merge_global(&mut self, file: GlobalFile) {
        if let Some(version) = file.version {
            self.version = version;
        }
        let Some(defaults) = file.isolation.and_then(|i| i.defaults) else {
            return;
        };
        if let Some(vm) = defaults.vm {
            self.merge_vm_fields(vm, true);
        }
        let target = &mut self.isolation.defaults;
        if let Some(prefix) = defaults.github.and_then(|g| g.default_branch_prefix) {
            target.github.default_branch_prefix = prefix;
        }
        if let Some(sync_dir) = defaults.output.and_then(|o| o.sync_dir) {
            target.output.sync_dir = sync_dir;
        }
        if let Some(mode) = defaults.proxy.and_then(|p| p.mode) {
            target.proxy.mode = mode;
        }
    }

    fn merge_vm(&mut self, file: VmFile) {
        self.merge_vm_fields(file, false);
    }

    /// The per-VM file cannot blank out the base image; the global file can
    /// (and then fails validation).
    fn merge_vm_fields(&mut self, file: VmFile, allow_empty_image: bool) {
        let vm = &mut self.isolation.defaults.vm;
        if let Some(cpu) = file.cpu {
            vm.cpu = cpu;
        }
        if let Some(memory) = file.memory {
            vm.memory = memory;
        }
        if let Some(disk_size) = file.disk_size {
            vm.disk_size = disk_size;
        }
        if let Some(image) = file.base_image
            && (allow_empty_image || !image.is_empty())
        {
            vm.base_image = image;
        }
    }

    /// Check every value against its allowed range.
    pub fn validate(&self, path: Option<&Path>) -> Result<()> {
        let d = &self.isolation.defaults;
        let invalid = |field: &'static str, value: String, expected: String| -> Result<()> {
            Err(IsolationError::ConfigurationInvalid {
                field,
                value,
                expected,
                path: path.map(Path::to_path_buf),
            }
            .into())
        };

        if !(MIN_CPU..=MAX_CPU).contains(&d.vm.cpu) {
            return invalid(
                "CPU",
                d.vm.cpu.to_string(),
                format!("between {} and {}", MIN_CPU, MAX_CPU),
            );
        }
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&d.vm.memory) {
            return invalid(
                "memory",
                d.vm.memory.to_string(),
                format!("between {} and {} MB", MIN_MEMORY_MB, MAX_MEMORY_MB),
            );
        }
        if !(MIN_DISK_GB..=MAX_DISK_GB).contains(&d.vm.disk_size) {
            return invalid(
                "disk_size",
                d.vm.disk_size.to_string(),
                format!("between {} and {} GB", MIN_DISK_GB, MAX_DISK_GB),
            );
        }
        if d.vm.base_image.is_empty() {
            return invalid("base_image", String::new(), "a non-empty string".to_string());
        }
        if ProxyMode::parse(&d.proxy.mode).is_none() {
            return invalid(
                "proxy mode",
                d.proxy.mode.clone(),
                "one of: auto, on, off".to_string(),
            );
        }
        Ok(())
    }

    pub fn settings(&self) -> ProviderSettings {
        let d = &self.isolation.defaults;
        ProviderSettings {
            cpu: d.vm.cpu,
            memory: d.vm.memory,
            disk_size: d.vm.disk_size,
            base_image: d.vm.base_image.clone(),
            proxy_mode: ProxyMode::parse(&d.proxy.mode).unwrap_or(ProxyMode::Auto),
            branch_prefix: d.github.default_branch_prefix.clone(),
            sync_dir: d.output.sync_dir.clone(),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "config:reading file");
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(contents))
}

fn calf_dir() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(IsolationError::HomeUnavailable)?;
    Ok(home.join(".calf"))
}

/// `~/.calf/config.yaml`
pub fn global_config_path() -> Result<PathBuf> {
    Ok(calf_dir()?.join("config.yaml"))
}

/// `~/.calf/isolation/vms/<name>/vm.yaml`
pub fn vm_config_path(vm_name: &str) -> Result<PathBuf> {
    Ok(calf_dir()?
        .join("isolation")
        .join("vms")
        .join(vm_name)
        .join("vm.yaml"))
}
