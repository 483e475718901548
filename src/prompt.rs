//! Interactive confirmation, behind a trait so decision logic can be tested
//! without a terminal.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Source of answers to yes/no questions.
pub trait Confirm {
    /// Show `prompt` and return the raw response line, or `None` on end of input.
    fn ask(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Prompts on stderr and reads a line from stdin.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush().context("Failed to flush stderr")?;

        let mut input = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut input)
            .context("Failed to read response")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(input))
    }
}

/// Normalized form of a response: trimmed and lowercased.
pub fn normalize(response: &str) -> String {
    response.trim().to_lowercase()
}

/// `[y/N]` semantics: only an explicit yes confirms.
pub fn is_explicit_yes(response: &str) -> bool {
    matches!(normalize(response).as_str(), "y" | "yes")
}

/// `[Y/n]` semantics: an empty response counts as yes.
pub fn is_yes_default(response: &str) -> bool {
    matches!(normalize(response).as_str(), "" | "y" | "yes")
}
