//! Records exchanged between the engine and its caller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::difficulty::{DifficultyLevel, Language};
use crate::error::EpisodeError;
use crate::executor::CommandResult;
use crate::reward::RewardBreakdown;
use crate::scenario::TaskFields;
use crate::verifier::VerificationResult;

/// One agent turn: a batch of shell-like commands and the agent's own
/// estimate of how long they take, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub commands: Vec<String>,
    pub time_estimate: f64,
}

impl Action {
    pub fn new<I, S>(commands: I, time_estimate: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            time_estimate,
        }
    }

    /// Parses `{"commands": [..], "time_estimate": n}`.
    pub fn from_json(input: &str) -> Result<Self, EpisodeError> {
        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| EpisodeError::InvalidAction(format!("not valid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| EpisodeError::InvalidAction("action must be a JSON object".to_string()))?;

        let commands = object
            .get("commands")
            .and_then(|c| c.as_array())
            .ok_or_else(|| EpisodeError::InvalidAction("'commands' must be a list".to_string()))?
            .iter()
            .map(|c| {
                c.as_str().map(str::to_string).ok_or_else(|| {
                    EpisodeError::InvalidAction("every command must be a string".to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time_estimate = object
            .get("time_estimate")
            .and_then(|t| t.as_f64())
            .ok_or_else(|| EpisodeError::InvalidAction("'time_estimate' must be a number".to_string()))?;

        Ok(Self {
            commands,
            time_estimate,
        })
    }
}

/// What the agent sees after reset and after each step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub task_description: String,
    pub file_tree: String,
    pub cli_history: String,
}

/// Diagnostics attached to every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInfo {
    pub step: u32,
    pub verification_results: Vec<VerificationResult>,
    pub reward_breakdown: RewardBreakdown,
    pub execution_results: Vec<CommandResult>,
    pub regression_count: usize,
    pub commands_used: u32,
    pub command_budget: u32,
    /// Every expected test passes.
    pub solved: bool,
    /// Wall-clock seconds spent running the step's commands.
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

impl StepInfo {
    pub(crate) fn empty(step: u32, command_budget: u32) -> Self {
        Self {
            step,
            verification_results: Vec::new(),
            reward_breakdown: RewardBreakdown::zero(),
            execution_results: Vec::new(),
            regression_count: 0,
            commands_used: 0,
            command_budget,
            solved: false,
            elapsed_secs: 0.0,
            error: None,
        }
    }
}

/// Result of [`EpisodeEngine::step`](super::EpisodeEngine::step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    /// The episode reached a natural end (solved or out of steps).
    pub terminated: bool,
    /// The episode was cut short (budget spent or infrastructure failure).
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Returned by reset: everything needed to present the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: Uuid,
    pub language: Language,
    pub difficulty: DifficultyLevel,
    pub template: String,
    pub task_description: String,
    pub file_tree: String,
    pub cli_history: String,
    pub command_budget: u32,
    pub expected_commands: u32,
    pub bug_count: usize,
    /// Tests passing on the initial working copy.
    pub baseline_passing: Vec<String>,
    pub text_fields: TaskFields,
}

impl ScenarioSummary {
    pub fn observation(&self) -> Observation {
        Observation {
            task_description: self.task_description.clone(),
            file_tree: self.file_tree.clone(),
            cli_history: self.cli_history.clone(),
        }
    }
}
