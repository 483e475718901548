//! Tart VM control.
//!
//! Wraps the `tart` CLI. VM state is never cached: every query lists all VMs
//! and searches by name.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::IsolationError;
use super::clock::{Clock, SystemClock};
use crate::cmd::Cmd;
use crate::prompt::{self, Confirm, StdinConfirm};

pub const TART_BINARY: &str = "tart";
const BREW_BINARY: &str = "brew";
const TART_FORMULA: &str = "cirruslabs/cli/tart";

pub const TART_INSTALL_PROMPT: &str = "Tart is not installed. Install via Homebrew? [Y/n]: ";
const MANUAL_INSTALL_GUIDANCE: &str =
    "Homebrew is not available. Please install Tart manually: https://github.com/cirruslabs/tart";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Read-only share of Tart's image cache, attached to every run.
pub const CACHE_DIR_MOUNT: &str = "tart-cache:~/.tart/cache:ro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    #[serde(alias = "Running")]
    Running,
    #[serde(alias = "Stopped", alias = "suspended", alias = "Suspended")]
    Stopped,
    #[serde(skip_deserializing)]
    NotFound,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VmState::Running => "running",
            VmState::Stopped => "stopped",
            VmState::NotFound => "not_found",
        })
    }
}

/// One row of `tart list --format json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmInfo {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "State")]
    pub state: VmState,
    /// Disk usage in GB, when reported.
    #[serde(default, alias = "Size")]
    pub size: Option<f64>,
}

/// Parse the JSON array printed by `tart list --format json`.
pub fn parse_vm_list(stdout: &str) -> Result<Vec<VmInfo>> {
    serde_json::from_str(stdout).context("Failed to parse VM list JSON")
}

/// Process boundary for the Tart binary.
pub trait TartRunner {
    /// Run to completion with stdout and stderr captured; returns stdout.
    fn output(&self, program: &Path, args: &[String]) -> Result<String>;

    /// Run attached to the terminal, blocking until the process exits.
    fn attached(&self, program: &Path, args: &[String]) -> Result<()>;
}

/// Spawns real processes.
pub struct ProcessRunner;

impl TartRunner for ProcessRunner {
    fn output(&self, program: &Path, args: &[String]) -> Result<String> {
        Cmd::new(program)
            .args(args.iter().map(String::as_str))
            .run_and_capture_stdout()
    }

    fn attached(&self, program: &Path, args: &[String]) -> Result<()> {
        Cmd::new(program)
            .args(args.iter().map(String::as_str))
            .run_attached()
    }
}

/// Outcome of looking for the Tart binary and its installer.
#[derive(Debug, PartialEq, Eq)]
pub enum Availability {
    Installed(PathBuf),
    /// Tart is absent but Homebrew is at the given path.
    Installable(PathBuf),
    Missing,
}

pub fn check_availability(tart: Option<PathBuf>, installer: Option<PathBuf>) -> Availability {
    match (tart, installer) {
        (Some(path), _) => Availability::Installed(path),
        (None, Some(brew)) => Availability::Installable(brew),
        (None, None) => Availability::Missing,
    }
}

/// Decide whether to install from the user's answer to [`TART_INSTALL_PROMPT`].
/// An empty answer means yes; end of input means no.
pub fn install_decision(response: Option<&str>) -> Result<()> {
    match response {
        Some(answer) if prompt::is_yes_default(answer) => Ok(()),
        _ => Err(IsolationError::InstallationCancelled {
            tool: TART_BINARY.to_string(),
        }
        .into()),
    }
}

/// Finds a binary by name, `None` when it is not installed.
type Locator = Box<dyn Fn(&str) -> Option<PathBuf>>;

fn locate_on_path(binary: &str) -> Option<PathBuf> {
    which::which(binary).ok()
}

/// Options for [`TartClient::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub headless: bool,
    pub vnc: bool,
    pub vnc_experimental: bool,
    /// Extra `--dir` specs (`name:path[:ro]`).
    pub dirs: Vec<String>,
}

pub struct TartClient {
    tart_path: Option<PathBuf>,
    runner: Box<dyn TartRunner>,
    confirm: Box<dyn Confirm>,
    clock: Box<dyn Clock>,
    out: Box<dyn Write>,
    locate: Locator,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl TartClient {
    pub fn new() -> Self {
        Self {
            tart_path: None,
            runner: Box::new(ProcessRunner),
            confirm: Box::new(StdinConfirm),
            clock: Box::new(SystemClock),
            out: Box::new(io::stdout()),
            locate: Box::new(locate_on_path),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_runner(mut self, runner: Box<dyn TartRunner>) -> Self {
        self.runner = runner;
        self
    }

    #[cfg(test)]
    pub fn with_confirm(mut self, confirm: Box<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    /// Use a known binary path instead of searching PATH.
    #[cfg(test)]
    pub fn with_tart_path(mut self, path: PathBuf) -> Self {
        self.tart_path = Some(path);
        self
    }

    /// Replace the PATH lookup used to find `tart` and `brew`.
    #[cfg(test)]
    pub fn with_locator<F>(mut self, locate: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf> + 'static,
    {
        self.locate = Box::new(locate);
        self
    }

    #[cfg(test)]
    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    /// Resolve the Tart binary, offering a Homebrew install when it is
    /// missing. The resolved path is memoized for the client's lifetime.
    pub fn ensure_installed(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.tart_path {
            return Ok(path.clone());
        }

        let tart = (self.locate)(TART_BINARY);
        let installer = (self.locate)(BREW_BINARY);
        let path = match check_availability(tart, installer) {
            Availability::Installed(path) => path,
            Availability::Missing => {
                return Err(IsolationError::ExternalToolMissing {
                    tool: TART_BINARY.to_string(),
                    guidance: MANUAL_INSTALL_GUIDANCE.to_string(),
                }
                .into());
            }
            Availability::Installable(brew) => {
                let response = self.confirm.ask(TART_INSTALL_PROMPT)?;
                install_decision(response.as_deref())?;
                self.install_tart(&brew)?
            }
        };

        debug!(path = %path.display(), "tart:resolved binary");
        self.tart_path = Some(path.clone());
        Ok(path)
    }

    fn install_tart(&mut self, brew: &Path) -> Result<PathBuf> {
        writeln!(self.out, "Installing Tart via Homebrew...")?;
        let args = strings(["install", TART_FORMULA]);
        self.runner
            .attached(brew, &args)
            .context("Failed to install Tart")?;

        let path = (self.locate)(TART_BINARY).ok_or_else(|| {
            anyhow::anyhow!("tart installation completed but 'tart' command not found in PATH")
        })?;
        writeln!(self.out, "tart installed successfully")?;
        info!(path = %path.display(), "tart:installed");
        Ok(path)
    }

    fn tart(&mut self, args: &[String]) -> Result<String> {
        let program = self.ensure_installed()?;
        debug!("executing tart command: tart {}", args.join(" "));
        self.runner.output(&program, args)
    }

    pub fn clone_vm(&mut self, image: &str, name: &str) -> Result<()> {
        self.tart(&strings(["clone", image, name]))
            .with_context(|| format!("failed to clone VM {} from {}", name, image))?;
        info!(vm = name, image, "tart:cloned");
        Ok(())
    }

    /// Set VM resources. Zero or empty values are left out so Tart keeps the
    /// current setting.
    pub fn configure(&mut self, name: &str, cpu: u32, memory: u32, disk: &str) -> Result<()> {
        self.tart(&configure_args(name, cpu, memory, disk))
            .with_context(|| format!("failed to configure VM {}", name))?;
        Ok(())
    }

    /// Boot a VM in the foreground. Blocks until the VM session ends.
    pub fn run(&mut self, name: &str, options: &RunOptions) -> Result<()> {
        let program = self.ensure_installed()?;
        let args = run_args(name, options);
        info!(vm = name, args = ?args, "tart:run");
        self.runner
            .attached(&program, &args)
            .with_context(|| format!("failed to start VM {}", name))
    }

    pub fn stop(&mut self, name: &str, force: bool) -> Result<()> {
        let mut args = strings(["stop", name]);
        if force {
            args.push("--timeout=0".to_string());
        }
        self.tart(&args)
            .with_context(|| format!("failed to stop VM {}", name))?;
        info!(vm = name, force, "tart:stopped");
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.tart(&strings(["delete", name]))
            .with_context(|| format!("failed to delete VM {}", name))?;
        info!(vm = name, "tart:deleted");
        Ok(())
    }

    pub fn list(&mut self) -> Result<Vec<VmInfo>> {
        let stdout = self
            .tart(&strings(["list", "--format", "json"]))
            .context("failed to list VMs")?;
        parse_vm_list(&stdout)
    }

    pub fn get(&mut self, name: &str) -> Result<VmInfo> {
        self.list()?
            .into_iter()
            .find(|vm| vm.name == name)
            .ok_or_else(|| IsolationError::VmNotFound(name.to_string()).into())
    }

    /// Current state; any failure to find the VM collapses to `NotFound`.
    pub fn state(&mut self, name: &str) -> VmState {
        match self.get(name) {
            Ok(vm) => vm.state,
            Err(e) => {
                debug!(vm = name, error = %e, "tart:state lookup failed");
                VmState::NotFound
            }
        }
    }

    pub fn is_running(&mut self, name: &str) -> bool {
        self.state(name) == VmState::Running
    }

    pub fn exists(&mut self, name: &str) -> bool {
        self.state(name) != VmState::NotFound
    }

    /// Poll `tart ip` until the VM reports an address or `timeout` elapses.
    /// A zero timeout selects the client default.
    pub fn ip(&mut self, name: &str, timeout: Duration) -> Result<String> {
        let timeout = if timeout.is_zero() {
            self.poll_timeout
        } else {
            timeout
        };
        self.ensure_installed()?;

        let args = strings(["ip", name]);
        let start = self.clock.now();
        let mut waited = false;
        while self.clock.now().duration_since(start) < timeout {
            match self.tart(&args) {
                Ok(output) => {
                    let ip = output.trim();
                    if !ip.is_empty() {
                        if waited {
                            writeln!(self.out)?;
                        }
                        debug!(vm = name, ip, "tart:ip acquired");
                        return Ok(ip.to_string());
                    }
                }
                Err(e) => debug!(vm = name, error = %e, "tart:ip not ready"),
            }

            let elapsed = self.clock.now().duration_since(start);
            write!(self.out, "\rWaiting for VM to boot... {}s", elapsed.as_secs())?;
            self.out.flush()?;
            waited = true;

            self.clock.sleep(self.poll_interval);
        }

        writeln!(self.out)?;
        Err(IsolationError::BootTimeout {
            name: name.to_string(),
            timeout,
        }
        .into())
    }
}

impl Default for TartClient {
    fn default() -> Self {
        Self::new()
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn configure_args(name: &str, cpu: u32, memory: u32, disk: &str) -> Vec<String> {
    let mut args = strings(["set", name]);
    if cpu > 0 {
        args.push(format!("--cpu={}", cpu));
    }
    if memory > 0 {
        args.push(format!("--memory={}", memory));
    }
    if !disk.is_empty() {
        args.push(format!("--disk-size={}", disk));
    }
    args
}

fn run_args(name: &str, options: &RunOptions) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if options.headless {
        args.push("--headless".to_string());
    }
    if options.vnc {
        args.push("--vnc".to_string());
    }
    if options.vnc_experimental {
        args.push("--vnc-experimental".to_string());
    }
    args.push(format!("--dir={}", CACHE_DIR_MOUNT));
    for dir in &options.dirs {
        args.push(format!("--dir={}", dir));
    }
    args.push(name.to_string());
    args
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    let home = home::home_dir().ok_or(IsolationError::HomeUnavailable)?;
    Ok(home.join(rest.trim_start_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::clock::testing::ManualClock;
    use crate::prompt::testing::ScriptedConfirm;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<Vec<String>>>>;

    /// Answers by subcommand and records every invocation.
    struct FakeRunner {
        responses: HashMap<&'static str, std::result::Result<&'static str, &'static str>>,
        calls: Calls,
    }

    impl FakeRunner {
        fn new(
            responses: &[(&'static str, std::result::Result<&'static str, &'static str>)],
        ) -> (Self, Calls) {
            let calls = Calls::default();
            (
                Self {
                    responses: responses.iter().cloned().collect(),
                    calls: Rc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl TartRunner for FakeRunner {
        fn output(&self, _program: &Path, args: &[String]) -> Result<String> {
            self.calls.borrow_mut().push(args.to_vec());
            match self.responses.get(args[0].as_str()) {
                Some(Ok(stdout)) => Ok(stdout.to_string()),
                Some(Err(stderr)) => Err(IsolationError::ExternalToolFailure {
                    command: format!("tart {}", args.join(" ")),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }
                .into()),
                None => Ok(String::new()),
            }
        }

        fn attached(&self, _program: &Path, args: &[String]) -> Result<()> {
            self.calls.borrow_mut().push(args.to_vec());
            Ok(())
        }
    }

    fn client(
        responses: &[(&'static str, std::result::Result<&'static str, &'static str>)],
    ) -> (TartClient, Calls) {
        let (runner, calls) = FakeRunner::new(responses);
        let client = TartClient::new()
            .with_tart_path(PathBuf::from("/opt/homebrew/bin/tart"))
            .with_runner(Box::new(runner))
            .with_output(Box::new(io::sink()));
        (client, calls)
    }

    const LISTING: &str = r#"[
        {"Name": "calf-dev", "State": "running", "Size": 42.5, "Source": "local"},
        {"Name": "calf-idle", "State": "stopped"}
    ]"#;

    #[test]
    fn vm_state_strings() {
        assert_eq!(VmState::Running.to_string(), "running");
        assert_eq!(VmState::Stopped.to_string(), "stopped");
        assert_eq!(VmState::NotFound.to_string(), "not_found");
    }

    #[test]
    fn parse_listing_with_optional_size() {
        let vms = parse_vm_list(LISTING).unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].name, "calf-dev");
        assert_eq!(vms[0].state, VmState::Running);
        assert_eq!(vms[0].size, Some(42.5));
        assert_eq!(vms[1].state, VmState::Stopped);
        assert_eq!(vms[1].size, None);
    }

    #[test]
    fn parse_listing_rejects_garbage() {
        assert!(parse_vm_list("not json").is_err());
        assert!(parse_vm_list(r#"[{"name": "x", "state": "exploded"}]"#).is_err());
    }

    #[test]
    fn empty_listing_means_not_found() {
        let (mut client, _) = client(&[("list", Ok("[]"))]);
        assert_eq!(client.state("anything"), VmState::NotFound);
        assert!(!client.is_running("anything"));
        assert!(!client.exists("anything"));

        let err = client.get("anything").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IsolationError>(),
            Some(IsolationError::VmNotFound(name)) if name == "anything"
        ));
    }

    #[test]
    fn state_is_derived_from_listing() {
        let (mut client, calls) = client(&[("list", Ok(LISTING))]);
        assert!(client.is_running("calf-dev"));
        assert!(client.exists("calf-idle"));
        assert!(!client.is_running("calf-idle"));
        // Every query lists again.
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn list_failure_collapses_to_not_found() {
        let (mut client, _) = client(&[("list", Err("boom"))]);
        assert_eq!(client.state("calf-dev"), VmState::NotFound);
        assert!(client.list().is_err());
    }

    #[test]
    fn configure_omits_zero_values() {
        let (mut client, calls) = client(&[]);
        client.configure("calf-dev", 0, 0, "").unwrap();
        assert_eq!(calls.borrow()[0], vec!["set", "calf-dev"]);
    }

    #[test]
    fn configure_emits_set_values() {
        let (mut client, calls) = client(&[]);
        client.configure("calf-dev", 4, 8192, "80").unwrap();
        assert_eq!(
            calls.borrow()[0],
            vec!["set", "calf-dev", "--cpu=4", "--memory=8192", "--disk-size=80"]
        );
    }

    #[test]
    fn clone_failure_names_vm_and_image() {
        let (mut client, _) = client(&[("clone", Err("no such image"))]);
        let err = client.clone_vm("ghcr.io/x/base:latest", "calf-dev").unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("failed to clone VM calf-dev from ghcr.io/x/base:latest"));
        assert!(msg.contains("no such image"));
    }

    #[test]
    fn run_always_mounts_cache() {
        let (mut client, calls) = client(&[]);
        let options = RunOptions {
            headless: true,
            vnc: false,
            vnc_experimental: true,
            dirs: vec!["project:~/src/project".to_string()],
        };
        client.run("calf-dev", &options).unwrap();
        assert_eq!(
            calls.borrow()[0],
            vec![
                "run",
                "--headless",
                "--vnc-experimental",
                "--dir=tart-cache:~/.tart/cache:ro",
                "--dir=project:~/src/project",
                "calf-dev",
            ]
        );
    }

    #[test]
    fn stop_force_uses_zero_timeout() {
        let (mut client, calls) = client(&[]);
        client.stop("calf-dev", false).unwrap();
        client.stop("calf-dev", true).unwrap();
        client.delete("calf-dev").unwrap();
        let calls = calls.borrow();
        assert_eq!(calls[0], vec!["stop", "calf-dev"]);
        assert_eq!(calls[1], vec!["stop", "calf-dev", "--timeout=0"]);
        assert_eq!(calls[2], vec!["delete", "calf-dev"]);
    }

    #[test]
    fn ip_returns_trimmed_address() {
        let (clock, _) = ManualClock::new();
        let (client, _) = client(&[("ip", Ok("192.168.64.5\n"))]);
        let mut client = client.with_clock(Box::new(clock));
        assert_eq!(
            client.ip("calf-dev", Duration::from_secs(5)).unwrap(),
            "192.168.64.5"
        );
    }

    #[test]
    fn ip_times_out_after_timeout() {
        let (clock, elapsed) = ManualClock::new();
        let (client, calls) = client(&[("ip", Ok(""))]);
        let interval = Duration::from_secs(2);
        let timeout = Duration::from_secs(10);
        let mut client = client
            .with_clock(Box::new(clock))
            .with_poll(interval, Duration::from_secs(60));

        let err = client.ip("calf-dev", timeout).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IsolationError>(),
            Some(IsolationError::BootTimeout { name, timeout: t }) if name == "calf-dev" && *t == timeout
        ));
        assert!(elapsed.get() >= timeout);
        assert!(elapsed.get() < timeout + interval);
        assert_eq!(calls.borrow().len(), 5);
    }

    #[test]
    fn ip_zero_timeout_uses_default() {
        let (clock, elapsed) = ManualClock::new();
        let (client, _) = client(&[("ip", Err("no IP yet"))]);
        let mut client = client
            .with_clock(Box::new(clock))
            .with_poll(Duration::from_secs(1), Duration::from_secs(3));

        let err = client.ip("calf-dev", Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("within 3s"));
        assert_eq!(elapsed.get(), Duration::from_secs(3));
    }

    #[test]
    fn availability_states() {
        let path = PathBuf::from("/usr/local/bin/tart");
        let brew = PathBuf::from("/opt/homebrew/bin/brew");
        assert_eq!(
            check_availability(Some(path.clone()), Some(brew.clone())),
            Availability::Installed(path)
        );
        assert_eq!(
            check_availability(None, Some(brew.clone())),
            Availability::Installable(brew)
        );
        assert_eq!(check_availability(None, None), Availability::Missing);
    }

    #[test]
    fn install_decision_defaults_to_yes() {
        assert!(install_decision(Some("\n")).is_ok());
        assert!(install_decision(Some("y")).is_ok());
        assert!(install_decision(Some("YES")).is_ok());

        for answer in [Some("n"), Some("nope"), None] {
            let err = install_decision(answer).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<IsolationError>(),
                Some(IsolationError::InstallationCancelled { .. })
            ));
        }
    }

    #[test]
    fn memoized_path_skips_prompt() {
        let (client, _) = client(&[]);
        let mut client = client.with_confirm(Box::new(ScriptedConfirm::new([Some("n")])));
        assert_eq!(
            client.ensure_installed().unwrap(),
            PathBuf::from("/opt/homebrew/bin/tart")
        );
    }

    /// Client with no known tart path, so `ensure_installed` runs the lookup.
    fn uninstalled_client(
        found: &'static [&'static str],
        confirm: &Rc<RefCell<ScriptedConfirm>>,
    ) -> (TartClient, Calls) {
        let (runner, calls) = FakeRunner::new(&[]);
        let client = TartClient::new()
            .with_runner(Box::new(runner))
            .with_confirm(Box::new(Rc::clone(confirm)))
            .with_output(Box::new(io::sink()))
            .with_locator(move |binary: &str| {
                found
                    .iter()
                    .any(|name| *name == binary)
                    .then(|| PathBuf::from("/opt/homebrew/bin").join(binary))
            });
        (client, calls)
    }

    #[test]
    fn missing_tart_without_homebrew_never_prompts() {
        let confirm = Rc::new(RefCell::new(ScriptedConfirm::new([Some("y")])));
        let (mut client, calls) = uninstalled_client(&[], &confirm);

        let err = client.ensure_installed().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IsolationError>(),
            Some(IsolationError::ExternalToolMissing { tool, .. }) if tool == "tart"
        ));
        assert!(confirm.borrow().prompts.is_empty());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn declined_install_does_not_run_homebrew() {
        let confirm = Rc::new(RefCell::new(ScriptedConfirm::new([Some("n\n")])));
        let (mut client, calls) = uninstalled_client(&["brew"], &confirm);

        let err = client.ensure_installed().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IsolationError>(),
            Some(IsolationError::InstallationCancelled { .. })
        ));
        assert_eq!(confirm.borrow().prompts, vec![TART_INSTALL_PROMPT]);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn installed_tart_is_found_without_prompting() {
        let confirm = Rc::new(RefCell::new(ScriptedConfirm::default()));
        let (mut client, _) = uninstalled_client(&["tart", "brew"], &confirm);

        assert_eq!(
            client.ensure_installed().unwrap(),
            PathBuf::from("/opt/homebrew/bin/tart")
        );
        assert!(confirm.borrow().prompts.is_empty());
    }

    #[test]
    fn expand_tilde_paths() {
        assert_eq!(expand_tilde("/abs/path").unwrap(), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel/path").unwrap(), PathBuf::from("rel/path"));
        if let Some(home) = home::home_dir() {
            assert_eq!(expand_tilde("~/calf-output").unwrap(), home.join("calf-output"));
        }
    }
}
