use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, trace};

use crate::isolation::IsolationError;

/// A builder for executing external commands with unified error handling
pub struct Cmd<'a> {
    program: &'a OsStr,
    args: Vec<&'a str>,
    workdir: Option<&'a Path>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder
    pub fn new<S: AsRef<OsStr> + ?Sized>(program: &'a S) -> Self {
        Self {
            program: program.as_ref(),
            args: Vec::new(),
            workdir: None,
        }
    }

    /// Add multiple arguments
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.args.extend(args);
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: &'a Path) -> Self {
        self.workdir = Some(path);
        self
    }

    fn display(&self) -> String {
        let program = Path::new(self.program)
            .file_name()
            .unwrap_or(self.program)
            .to_string_lossy();
        if self.args.is_empty() {
            program.into_owned()
        } else {
            format!("{} {}", program, self.args.join(" "))
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.program);
        if let Some(dir) = self.workdir {
            cmd.current_dir(dir);
        }
        cmd.args(&self.args);
        cmd
    }

    /// Execute the command with stdout and stderr captured separately.
    /// A non-zero exit becomes [`IsolationError::ExternalToolFailure`] carrying both streams.
    pub fn run(self) -> Result<Output> {
        let command_line = self.display();
        let workdir_display = self.workdir.map(|p| p.display().to_string());
        trace!(command = %command_line, workdir = ?workdir_display, "cmd:run start");

        let output = self
            .command()
            .output()
            .with_context(|| format!("Failed to execute command: {}", command_line))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(
                command = %command_line,
                status = ?output.status.code(),
                stderr = %stderr,
                "cmd:run failure"
            );
            return Err(IsolationError::ExternalToolFailure {
                command: command_line,
                stdout,
                stderr,
            }
            .into());
        }
        trace!(command = %command_line, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a string (untrimmed)
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?)
    }

    /// Execute the command attached to the current terminal and wait for it to exit.
    pub fn run_attached(self) -> Result<()> {
        let command_line = self.display();
        debug!(command = %command_line, "cmd:attached start");

        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to execute command: {}", command_line))?;

        if !status.success() {
            debug!(command = %command_line, status = ?status.code(), "cmd:attached failure");
            return Err(IsolationError::ExternalToolFailure {
                command: command_line,
                stdout: String::new(),
                stderr: format!("exited with code {}", status.code().unwrap_or(-1)),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_program_file_name() {
        let cmd = Cmd::new("/usr/local/bin/tart").args(["list", "--format", "json"]);
        assert_eq!(cmd.display(), "tart list --format json");
    }

    #[test]
    fn failing_command_carries_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo out; echo oops >&2; exit 3"])
            .run()
            .unwrap_err();
        match err.downcast_ref::<IsolationError>() {
            Some(IsolationError::ExternalToolFailure { stdout, stderr, .. }) => {
                assert_eq!(stdout, "out");
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn capture_stdout_returns_output() {
        let out = Cmd::new("sh")
            .args(["-c", "printf hello"])
            .run_and_capture_stdout()
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn attached_failure_names_command_and_exit_code() {
        let err = Cmd::new("sh")
            .args(["-c", "exit 2"])
            .run_attached()
            .unwrap_err();
        match err.downcast_ref::<IsolationError>() {
            Some(IsolationError::ExternalToolFailure {
                command, stderr, ..
            }) => {
                assert_eq!(command, "sh -c exit 2");
                assert_eq!(stderr, "exited with code 2");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn missing_program_names_command_line() {
        let err = Cmd::new("calf-no-such-binary")
            .args(["--version"])
            .run()
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("Failed to execute command: calf-no-such-binary --version")
        );
    }
}
