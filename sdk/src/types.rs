//! Action outcome types

use serde::{Deserialize, Serialize};

/// Uniform outcome of anything the agent executes.
///
/// Shell commands and every named tool return this same shape, so the agent
/// loop never special-cases result handling. An `exit_code` of 0 means success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Human-readable description of what ran
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Create a failed result with exit code 1
    pub fn failure(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// The most informative stream: stdout, else stderr, else `(no output)`.
    pub fn output(&self) -> &str {
        if !self.stdout.is_empty() {
            &self.stdout
        } else if !self.stderr.is_empty() {
            &self.stderr
        } else {
            "(no output)"
        }
    }
}
