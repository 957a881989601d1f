//! Error types for cli-rl-env operations.
//!
//! Defines error types for each subsystem of the episode pipeline:
//! - Bug injection and scenario construction
//! - Command validation (whitelist rejections)
//! - Sandbox infrastructure
//! - Verification checkers
//! - Episode lifecycle

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while injecting bugs into a source file.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Only {found} valid injection sites in '{file}', {requested} requested")]
    InsufficientSites {
        file: String,
        requested: usize,
        found: usize,
    },

    #[error("Source file '{0}' fails the syntax check before injection")]
    InvalidSource(String),

    #[error("Bug catalog has no transforms for {0}")]
    EmptyCatalog(String),
}

/// Errors raised while assembling a scenario.
#[derive(Debug, Error)]
pub enum ScenarioBuildError {
    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("No template for {0} can hold {1} bugs")]
    NoEligibleTemplate(String, usize),

    #[error("Scenario construction failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Injection error: {0}")]
    Injection(#[from] InjectionError),

    #[error("Sandbox error during scenario verification: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Reason code attached to a rejected command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    NotAllowed,
    AbsolutePath,
    Traversal,
    HomeDirectory,
    Metacharacter,
    Grammar,
    BudgetExceeded,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::NotAllowed => "not_allowed",
            RejectReason::AbsolutePath => "absolute_path",
            RejectReason::Traversal => "traversal",
            RejectReason::HomeDirectory => "home_directory",
            RejectReason::Metacharacter => "metacharacter",
            RejectReason::Grammar => "grammar",
            RejectReason::BudgetExceeded => "budget_exceeded",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command refused by the whitelist filter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Command rejected ({reason}): {message}")]
pub struct CommandRejected {
    pub command: String,
    pub reason: RejectReason,
    pub message: String,
}

impl CommandRejected {
    pub fn new(command: impl Into<String>, reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reason,
            message: message.into(),
        }
    }
}

/// Sandbox infrastructure failures. These are fatal to the episode.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to create sandbox: {0}")]
    CreateFailed(String),

    #[error("Refusing to materialize '{0}' outside the sandbox root")]
    PathEscape(String),

    #[error("Sandbox root {0} no longer exists")]
    RootMissing(String),

    #[error("Cleanup failed for {path}: {reason}")]
    CleanupFailed { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A verification checker could not produce a result.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Checker '{tool}' could not be started: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Checker timed out after {0}s")]
    Timeout(u64),

    #[error("Unparseable checker output: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the episode engine to its caller.
#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("No active episode; call reset first")]
    NoActiveEpisode,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Scenario build failed: {0}")]
    Scenario(#[from] ScenarioBuildError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}
