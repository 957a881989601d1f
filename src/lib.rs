//! cli-rl-env: reinforcement-learning episodes for command-line agents.
//!
//! Each episode hands the agent a small project with injected bugs, runs its
//! shell-like commands in a throwaway sandbox behind a whitelist, and scores
//! the working copy with tests, a linter and text checks.

// Core modules
pub mod cli;
pub mod difficulty;
pub mod episode;
pub mod error;
pub mod executor;
pub mod reward;
pub mod scenario;
pub mod verifier;

// Re-export commonly used error types
pub use error::{
    CommandRejected, EpisodeError, InjectionError, RejectReason, SandboxError, ScenarioBuildError,
    VerificationError,
};

pub use difficulty::{DifficultyLevel, Language, LanguageChoice};
pub use episode::{Action, EngineConfig, EpisodeEngine, Observation, ScenarioSummary, StepOutcome};
pub use reward::{RewardBreakdown, RewardCalculator};
pub use scenario::{Scenario, ScenarioBuilder};
