//! Typed failures surfaced by the cache manager, the Tart client and config loading.
//!
//! Everything is returned through `anyhow::Result`; callers that need to branch
//! on a specific failure downcast to [`IsolationError`].

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    /// A configuration value is outside its allowed range.
    #[error("Invalid {field} '{value}'{}: must be {expected}", in_path(.path))]
    ConfigurationInvalid {
        field: &'static str,
        value: String,
        expected: String,
        path: Option<PathBuf>,
    },

    #[error("invalid cache type: {0} (must be homebrew, npm, go, or git)")]
    InvalidCacheType(String),

    #[error("home directory not available")]
    HomeUnavailable,

    /// The external tool is absent and cannot be installed automatically.
    #[error("{tool} is not installed. {guidance}")]
    ExternalToolMissing { tool: String, guidance: String },

    #[error("{tool} installation cancelled")]
    InstallationCancelled { tool: String },

    /// An external subcommand exited unsuccessfully.
    #[error("{command} failed\nstdout: {stdout}\nstderr: {stderr}")]
    ExternalToolFailure {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("VM {0} not found")]
    VmNotFound(String),

    #[error("VM {name} did not acquire an IP address within {}s", .timeout.as_secs())]
    BootTimeout { name: String, timeout: Duration },
}

fn in_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in {}", p.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_invalid_names_field_and_path() {
        let err = IsolationError::ConfigurationInvalid {
            field: "CPU",
            value: "64".to_string(),
            expected: "between 1 and 32".to_string(),
            path: Some(PathBuf::from("/tmp/config.yaml")),
        };
        assert_eq!(
            err.to_string(),
            "Invalid CPU '64' in /tmp/config.yaml: must be between 1 and 32"
        );
    }

    #[test]
    fn configuration_invalid_without_path() {
        let err = IsolationError::ConfigurationInvalid {
            field: "memory",
            value: "1".to_string(),
            expected: "between 256 and 65536 MB".to_string(),
            path: None,
        };
        assert_eq!(
            err.to_string(),
            "Invalid memory '1': must be between 256 and 65536 MB"
        );
    }

    #[test]
    fn boot_timeout_reports_seconds() {
        let err = IsolationError::BootTimeout {
            name: "agent-1".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "VM agent-1 did not acquire an IP address within 60s"
        );
    }
}
