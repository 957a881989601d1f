//! Command execution: whitelist parsing, the per-episode sandbox, bounded
//! subprocesses and the simulated terminal history.

pub mod history;
pub mod parser;
pub mod process;
pub mod sandbox;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CommandRejected, RejectReason};

pub use history::CliHistory;
pub use parser::{CommandFilter, ParsedCommand, ALLOWED_COMMANDS};
pub use process::{
    ProcessOutput, ResourceLimits, DEFAULT_OUTPUT_CAP, NOT_FOUND_EXIT_CODE, REJECTED_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};
pub use sandbox::{Sandbox, SandboxConfig};

/// Outcome of one agent command, accepted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command as submitted.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    /// Output exceeded the capture cap.
    pub truncated: bool,
    pub timed_out: bool,
    /// Set when the whitelist filter refused the command.
    pub rejected: Option<RejectReason>,
    pub started_at: DateTime<Utc>,
}

impl CommandResult {
    /// Result recorded for a command that never ran.
    pub fn rejected(err: &CommandRejected) -> Self {
        Self {
            command: err.command.clone(),
            stdout: String::new(),
            stderr: err.to_string(),
            exit_code: REJECTED_EXIT_CODE,
            duration: Duration::ZERO,
            truncated: false,
            timed_out: false,
            rejected: Some(err.reason),
            started_at: Utc::now(),
        }
    }

    pub(crate) fn from_output(command: &str, output: ProcessOutput, started_at: DateTime<Utc>) -> Self {
        Self {
            command: command.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration: output.duration,
            truncated: output.truncated,
            timed_out: output.timed_out,
            rejected: None,
            started_at,
        }
    }

    pub(crate) fn builtin(
        command: &str,
        stdout: String,
        stderr: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            command: command.to_string(),
            stdout,
            stderr,
            exit_code,
            duration: Duration::ZERO,
            truncated: false,
            timed_out: false,
            rejected: None,
            started_at,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn was_rejected(&self) -> bool {
        self.rejected.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_result_uses_sentinel() {
        let err = CommandRejected::new("rm -rf /", RejectReason::AbsolutePath, "absolute path '/'");
        let result = CommandResult::rejected(&err);
        assert_eq!(result.exit_code, REJECTED_EXIT_CODE);
        assert!(result.was_rejected());
        assert!(result.stderr.contains("absolute path"));
        assert_eq!(result.command, "rm -rf /");
        assert!(!result.success());
    }
}
