//! Episode engine: reset builds a scenario and its sandbox, step runs an
//! action, verifies the working copy and computes the reward.
//!
//! # Example
//!
//! ```ignore
//! use cli_rl_env::difficulty::{DifficultyLevel, LanguageChoice};
//! use cli_rl_env::episode::{Action, EngineConfig, EpisodeEngine};
//!
//! let mut engine = EpisodeEngine::new(EngineConfig::default())?;
//! let summary = engine.reset(7, DifficultyLevel::Easy, LanguageChoice::Python).await?;
//! let outcome = engine.step(Action::new(["cat main.py"], 5.0)).await?;
//! println!("{} -> {}", summary.task_description, outcome.reward);
//! ```

pub mod config;
pub mod types;

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::difficulty::{DifficultyLevel, LanguageChoice};
use crate::error::{CommandRejected, EpisodeError, RejectReason};
use crate::executor::{CliHistory, CommandFilter, CommandResult, Sandbox};
use crate::reward::RewardCalculator;
use crate::scenario::{Scenario, ScenarioBuilder};
use crate::verifier::{regression_count, VerifierSuite};

pub use config::{ConfigError, EngineConfig};
pub use types::{Action, Observation, ScenarioSummary, StepInfo, StepOutcome};

/// State owned by a running episode.
#[derive(Debug)]
struct ActiveEpisode {
    scenario: Scenario,
    sandbox: Sandbox,
    verifier: VerifierSuite,
    baseline_passing: Vec<String>,
    history: CliHistory,
    task_description: String,
    command_budget: u32,
    commands_used: u32,
    steps: u32,
}

impl ActiveEpisode {
    fn observation(&self) -> Observation {
        Observation {
            task_description: self.task_description.clone(),
            file_tree: self.sandbox.file_tree(),
            cli_history: self.history.render(),
        }
    }
}

/// Drives one episode at a time. Run several engines for parallel episodes.
#[derive(Debug)]
pub struct EpisodeEngine {
    config: EngineConfig,
    builder: ScenarioBuilder,
    filter: CommandFilter,
    reward: RewardCalculator,
    episode: Option<ActiveEpisode>,
}

impl EpisodeEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut builder = ScenarioBuilder::new()
            .with_max_attempts(config.build_retries)
            .with_lint_error_cap(config.lint_error_cap)
            .with_test_timeout(config.verify_timeout());
        if let Some(template) = &config.template {
            builder = builder.with_template(template.clone());
        }
        let reward = RewardCalculator::new().with_weights(config.reward_weights);
        Ok(Self {
            config,
            builder,
            filter: CommandFilter::new(),
            reward,
            episode: None,
        })
    }

    /// Replaces the scenario builder (custom catalogs, pinned templates).
    pub fn with_builder(mut self, builder: ScenarioBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_filter(mut self, filter: CommandFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_reward_calculator(mut self, reward: RewardCalculator) -> Self {
        self.reward = reward;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    /// The scenario of the running episode.
    pub fn scenario(&self) -> Option<&Scenario> {
        self.episode.as_ref().map(|e| &e.scenario)
    }

    /// Starts a new episode, discarding any running one.
    pub async fn reset(
        &mut self,
        seed: u64,
        difficulty: DifficultyLevel,
        language: impl Into<LanguageChoice>,
    ) -> Result<ScenarioSummary, EpisodeError> {
        self.close();
        let language = language.into();
        let scenario = if self.config.verify_scenarios {
            self.builder.build_verified(language, difficulty, seed).await?
        } else {
            self.builder.build(language, difficulty, seed)?
        };
        self.reset_with_scenario(scenario).await
    }

    /// Starts a new episode with the configured difficulty and language.
    pub async fn reset_default(&mut self, seed: u64) -> Result<ScenarioSummary, EpisodeError> {
        let (difficulty, language) = (self.config.difficulty, self.config.language);
        self.reset(seed, difficulty, language).await
    }

    /// Starts a new episode on a scenario built elsewhere.
    pub async fn reset_with_scenario(&mut self, scenario: Scenario) -> Result<ScenarioSummary, EpisodeError> {
        self.close();

        let sandbox = Sandbox::create(&scenario.files, self.config.sandbox_config())?;
        let verifier = VerifierSuite::for_scenario(&scenario, self.config.verify_timeout())
            .with_weights(self.config.verification_weights);
        let baseline_passing = verifier
            .run_tests(sandbox.root())
            .await
            .map(|r| r.passing)
            .unwrap_or_default();

        let history = CliHistory::initial(&scenario.files);
        let command_budget = scenario.command_budget.min(self.config.max_commands);
        let task_description = scenario.task_description();

        let summary = ScenarioSummary {
            scenario_id: scenario.id,
            language: scenario.language,
            difficulty: scenario.difficulty,
            template: scenario.template.clone(),
            task_description: task_description.clone(),
            file_tree: scenario.file_tree(),
            cli_history: history.render(),
            command_budget,
            expected_commands: scenario.expected_commands,
            bug_count: scenario.bug_count(),
            baseline_passing: baseline_passing.clone(),
            text_fields: scenario.text_fields(),
        };

        info!(
            scenario = %scenario.id,
            template = %scenario.template,
            difficulty = %scenario.difficulty,
            baseline_passing = baseline_passing.len(),
            budget = command_budget,
            "Episode reset"
        );

        self.episode = Some(ActiveEpisode {
            scenario,
            sandbox,
            verifier,
            baseline_passing,
            history,
            task_description,
            command_budget,
            commands_used: 0,
            steps: 0,
        });
        Ok(summary)
    }

    /// Runs the action's commands in order, then verifies and scores.
    pub async fn step(&mut self, action: Action) -> Result<StepOutcome, EpisodeError> {
        let episode = self.episode.as_mut().ok_or(EpisodeError::NoActiveEpisode)?;
        episode.steps += 1;
        let mut info = StepInfo::empty(episode.steps, episode.command_budget);

        let started = Instant::now();
        let mut infra_error = None;
        for raw in &action.commands {
            let result = if episode.commands_used >= episode.command_budget {
                CommandResult::rejected(&CommandRejected::new(
                    raw.clone(),
                    RejectReason::BudgetExceeded,
                    format!("command budget of {} exhausted", episode.command_budget),
                ))
            } else {
                episode.commands_used += 1;
                match self.filter.validate(raw) {
                    Ok(parsed) => match episode.sandbox.run(&parsed).await {
                        Ok(result) => result,
                        Err(e) => {
                            infra_error = Some(e);
                            break;
                        }
                    },
                    Err(rejected) => {
                        debug!(command = %raw, reason = %rejected.reason, "Command rejected");
                        CommandResult::rejected(&rejected)
                    }
                }
            };
            episode.history.record(&result);
            info.execution_results.push(result);
        }
        info.elapsed_secs = started.elapsed().as_secs_f64();
        info.commands_used = episode.commands_used;

        if let Some(error) = infra_error {
            warn!(scenario = %episode.scenario.id, "Sandbox failure, truncating episode: {}", error);
            let observation = Observation {
                task_description: episode.task_description.clone(),
                file_tree: String::new(),
                cli_history: episode.history.render(),
            };
            info.error = Some(error.to_string());
            if let Some(cleanup_error) = self.finish() {
                warn!("Sandbox cleanup after failure: {}", cleanup_error);
            }
            return Ok(StepOutcome {
                observation,
                reward: 0.0,
                terminated: false,
                truncated: true,
                info,
            });
        }

        let report = episode.verifier.verify(episode.sandbox.root()).await;
        let solved = report.solved();
        let regressions = report
            .tests()
            .map_or(0, |tests| regression_count(&episode.baseline_passing, tests));
        let mut breakdown = self.reward.calculate(
            report.base_score,
            info.elapsed_secs,
            action.time_estimate,
            regressions,
            episode.scenario.test_spec.total(),
        );
        breakdown.components.insert(
            "efficiency".to_string(),
            RewardCalculator::efficiency(episode.scenario.expected_commands, episode.commands_used, solved),
        );

        let terminated = solved || episode.steps >= self.config.max_steps;
        let truncated = !solved && episode.commands_used >= episode.command_budget;
        let observation = episode.observation();
        let reward = breakdown.total_reward;

        info!(
            scenario = %episode.scenario.id,
            step = episode.steps,
            reward = reward,
            solved = solved,
            regressions = regressions,
            "Step complete"
        );

        info.verification_results = report.results;
        info.reward_breakdown = breakdown;
        info.regression_count = regressions;
        info.solved = solved;

        if terminated || truncated {
            info.error = self.finish();
        }

        Ok(StepOutcome {
            observation,
            reward,
            terminated,
            truncated,
            info,
        })
    }

    /// Parses a JSON action and steps. A malformed action ends the episode
    /// with zero reward and the parse error in `info.error`.
    pub async fn step_json(&mut self, input: &str) -> Result<StepOutcome, EpisodeError> {
        match Action::from_json(input) {
            Ok(action) => self.step(action).await,
            Err(parse_error) => {
                let episode = self.episode.as_mut().ok_or(EpisodeError::NoActiveEpisode)?;
                episode.steps += 1;
                let mut info = StepInfo::empty(episode.steps, episode.command_budget);
                info.commands_used = episode.commands_used;
                let observation = episode.observation();
                warn!(scenario = %episode.scenario.id, "Malformed action: {}", parse_error);
                info.error = Some(parse_error.to_string());
                if let Some(cleanup_error) = self.finish() {
                    warn!("Sandbox cleanup: {}", cleanup_error);
                }
                Ok(StepOutcome {
                    observation,
                    reward: 0.0,
                    terminated: true,
                    truncated: false,
                    info,
                })
            }
        }
    }

    /// Ends the running episode, if any, and removes its sandbox.
    pub fn close(&mut self) {
        if let Some(error) = self.finish() {
            warn!("Sandbox cleanup on close: {}", error);
        }
    }

    /// Destroys the active sandbox; returns the cleanup error, if any.
    fn finish(&mut self) -> Option<String> {
        let episode = self.episode.take()?;
        let id = episode.scenario.id;
        match episode.sandbox.destroy() {
            Ok(()) => {
                debug!(scenario = %id, "Episode finished");
                None
            }
            Err(e) => Some(e.to_string()),
        }
    }
}
