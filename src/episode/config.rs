//! Engine configuration.
//!
//! Defaults can be overridden from `CLI_RL_ENV_*` environment variables or
//! a YAML file, then adjusted with the `with_*` builders.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::difficulty::{DifficultyLevel, LanguageChoice};
use crate::executor::process::DEFAULT_OUTPUT_CAP;
use crate::executor::sandbox::SandboxConfig;
use crate::reward::RewardWeights;
use crate::scenario::DEFAULT_BUILD_ATTEMPTS;
use crate::verifier::linter::DEFAULT_LINT_ERROR_CAP;
use crate::verifier::VerificationWeights;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for an [`EpisodeEngine`](super::EpisodeEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Difficulty used when `reset` is not given one.
    pub difficulty: DifficultyLevel,
    /// Language used when `reset` is not given one.
    pub language: LanguageChoice,
    /// Pins every scenario to one template.
    pub template: Option<String>,
    /// Hard cap on commands per episode, on top of the difficulty budget.
    pub max_commands: u32,
    /// Steps before the episode terminates.
    pub max_steps: u32,
    pub command_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub output_cap_bytes: usize,
    pub lint_error_cap: usize,
    pub build_retries: u32,
    /// Run the tests against golden and buggy copies before accepting a scenario.
    pub verify_scenarios: bool,
    pub reward_weights: RewardWeights,
    pub verification_weights: VerificationWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            difficulty: DifficultyLevel::Easy,
            language: LanguageChoice::Python,
            template: None,
            max_commands: 50,
            max_steps: 1,
            command_timeout_secs: 30,
            verify_timeout_secs: 60,
            output_cap_bytes: DEFAULT_OUTPUT_CAP,
            lint_error_cap: DEFAULT_LINT_ERROR_CAP,
            build_retries: DEFAULT_BUILD_ATTEMPTS,
            verify_scenarios: false,
            reward_weights: RewardWeights::default(),
            verification_weights: VerificationWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CLI_RL_ENV_DIFFICULTY`: easy, medium, hard or very_hard (default: easy)
    /// - `CLI_RL_ENV_LANGUAGE`: python, javascript or random (default: python)
    /// - `CLI_RL_ENV_TEMPLATE`: pin a template by name
    /// - `CLI_RL_ENV_MAX_COMMANDS`: command cap per episode (default: 50)
    /// - `CLI_RL_ENV_MAX_STEPS`: steps per episode (default: 1)
    /// - `CLI_RL_ENV_COMMAND_TIMEOUT_SECS`: per-command timeout (default: 30)
    /// - `CLI_RL_ENV_VERIFY_TIMEOUT_SECS`: per-verifier timeout (default: 60)
    /// - `CLI_RL_ENV_OUTPUT_CAP_BYTES`: stdout/stderr capture cap (default: 100000)
    /// - `CLI_RL_ENV_LINT_ERROR_CAP`: lint errors for a zero score (default: 10)
    /// - `CLI_RL_ENV_BUILD_RETRIES`: scenario build attempts (default: 5)
    /// - `CLI_RL_ENV_VERIFY_SCENARIOS`: validate scenarios against tests (default: false)
    /// - `CLI_RL_ENV_TIME_PENALTY_WEIGHT` / `CLI_RL_ENV_REGRESSION_WEIGHT`: reward weights
    /// - `CLI_RL_ENV_TEST_WEIGHT` / `CLI_RL_ENV_LINT_WEIGHT` / `CLI_RL_ENV_TEXT_WEIGHT`:
    ///   verification weights
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CLI_RL_ENV_DIFFICULTY") {
            config.difficulty = parse_env_value(&val, "CLI_RL_ENV_DIFFICULTY")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_LANGUAGE") {
            config.language = parse_env_value(&val, "CLI_RL_ENV_LANGUAGE")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_TEMPLATE") {
            config.template = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_MAX_COMMANDS") {
            config.max_commands = parse_env_value(&val, "CLI_RL_ENV_MAX_COMMANDS")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_MAX_STEPS") {
            config.max_steps = parse_env_value(&val, "CLI_RL_ENV_MAX_STEPS")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = parse_env_value(&val, "CLI_RL_ENV_COMMAND_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_VERIFY_TIMEOUT_SECS") {
            config.verify_timeout_secs = parse_env_value(&val, "CLI_RL_ENV_VERIFY_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_OUTPUT_CAP_BYTES") {
            config.output_cap_bytes = parse_env_value(&val, "CLI_RL_ENV_OUTPUT_CAP_BYTES")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_LINT_ERROR_CAP") {
            config.lint_error_cap = parse_env_value(&val, "CLI_RL_ENV_LINT_ERROR_CAP")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_BUILD_RETRIES") {
            config.build_retries = parse_env_value(&val, "CLI_RL_ENV_BUILD_RETRIES")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_VERIFY_SCENARIOS") {
            config.verify_scenarios = parse_env_bool(&val, "CLI_RL_ENV_VERIFY_SCENARIOS")?;
        }

        // Reward weights
        if let Ok(val) = std::env::var("CLI_RL_ENV_TIME_PENALTY_WEIGHT") {
            config.reward_weights.time_penalty_weight =
                parse_env_value(&val, "CLI_RL_ENV_TIME_PENALTY_WEIGHT")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_REGRESSION_WEIGHT") {
            config.reward_weights.regression_weight = parse_env_value(&val, "CLI_RL_ENV_REGRESSION_WEIGHT")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_TEST_WEIGHT") {
            config.verification_weights.test = parse_env_value(&val, "CLI_RL_ENV_TEST_WEIGHT")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_LINT_WEIGHT") {
            config.verification_weights.lint = parse_env_value(&val, "CLI_RL_ENV_LINT_WEIGHT")?;
        }
        if let Ok(val) = std::env::var("CLI_RL_ENV_TEXT_WEIGHT") {
            config.verification_weights.text = parse_env_value(&val, "CLI_RL_ENV_TEXT_WEIGHT")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_commands == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_commands must be greater than 0".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_steps must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 || self.verify_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.output_cap_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "output_cap_bytes must be greater than 0".to_string(),
            ));
        }
        if self.lint_error_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "lint_error_cap must be greater than 0".to_string(),
            ));
        }
        if self.build_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "build_retries must be greater than 0".to_string(),
            ));
        }

        let RewardWeights {
            time_penalty_weight,
            regression_weight,
        } = self.reward_weights;
        for (name, weight) in [
            ("time_penalty_weight", time_penalty_weight),
            ("regression_weight", regression_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        let w = self.verification_weights;
        for (name, weight) in [("test", w.test), ("lint", w.lint), ("text", w.text)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "verification weight '{}' must be a non-negative number",
                    name
                )));
            }
        }
        if w.test + w.lint + w.text <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "verification weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Sandbox limits derived from this configuration.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig::default()
            .with_timeout(self.command_timeout())
            .with_output_cap(self.output_cap_bytes)
    }

    // Builder methods

    pub fn with_difficulty(mut self, difficulty: DifficultyLevel) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_language(mut self, language: impl Into<LanguageChoice>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_max_commands(mut self, max: u32) -> Self {
        self.max_commands = max;
        self
    }

    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_output_cap(mut self, bytes: usize) -> Self {
        self.output_cap_bytes = bytes;
        self
    }

    pub fn with_lint_error_cap(mut self, cap: usize) -> Self {
        self.lint_error_cap = cap;
        self
    }

    pub fn with_build_retries(mut self, retries: u32) -> Self {
        self.build_retries = retries;
        self
    }

    pub fn with_verify_scenarios(mut self, enabled: bool) -> Self {
        self.verify_scenarios = enabled;
        self
    }

    pub fn with_reward_weights(mut self, weights: RewardWeights) -> Self {
        self.reward_weights = weights;
        self
    }

    pub fn with_verification_weights(mut self, weights: VerificationWeights) -> Self {
        self.verification_weights = weights;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::Language;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.difficulty, DifficultyLevel::Easy);
        assert_eq!(config.language, LanguageChoice::Python);
        assert_eq!(config.max_commands, 50);
        assert_eq!(config.max_steps, 1);
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.verify_timeout(), Duration::from_secs(60));
        assert_eq!(config.output_cap_bytes, 100_000);
        assert_eq!(config.lint_error_cap, 10);
        assert_eq!(config.build_retries, 5);
        assert!(!config.verify_scenarios);
        assert!((config.reward_weights.time_penalty_weight - 0.1).abs() < f64::EPSILON);
        assert!((config.verification_weights.test - 0.7).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_difficulty(DifficultyLevel::Hard)
            .with_language(Language::JavaScript)
            .with_max_commands(12)
            .with_max_steps(3)
            .with_command_timeout(Duration::from_secs(5))
            .with_verify_scenarios(true);
        assert_eq!(config.difficulty, DifficultyLevel::Hard);
        assert_eq!(config.language, LanguageChoice::JavaScript);
        assert_eq!(config.max_commands, 12);
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.sandbox_config().timeout, Duration::from_secs(5));
        assert!(config.verify_scenarios);
    }

    #[test]
    fn test_validation_failures() {
        assert!(EngineConfig::new().with_max_commands(0).validate().is_err());
        assert!(EngineConfig::new().with_max_steps(0).validate().is_err());
        assert!(EngineConfig::new()
            .with_reward_weights(RewardWeights {
                time_penalty_weight: 1.5,
                regression_weight: 0.3,
            })
            .validate()
            .is_err());
        assert!(EngineConfig::new()
            .with_verification_weights(VerificationWeights::new(0.0, 0.0, 0.0))
            .validate()
            .is_err());
        assert!(EngineConfig::new()
            .with_verification_weights(VerificationWeights::new(f64::NAN, 0.2, 0.1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = "difficulty: very_hard\nlanguage: random\nmax_steps: 4\nreward_weights:\n  time_penalty_weight: 0.2\n  regression_weight: 0.5\n";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.difficulty, DifficultyLevel::VeryHard);
        assert_eq!(config.language, LanguageChoice::Random);
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.max_commands, 50);
        assert!((config.reward_weights.regression_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_yaml_invalid_values() {
        assert!(matches!(
            EngineConfig::from_yaml_str("max_steps: 0\n"),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("difficulty: impossible\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_parse_env_helpers() {
        assert_eq!(parse_env_value::<u32>(" 12 ", "K").unwrap(), 12);
        assert!(parse_env_value::<u32>("twelve", "K").is_err());
        assert_eq!(
            parse_env_value::<DifficultyLevel>("medium", "K").unwrap(),
            DifficultyLevel::Medium
        );
        assert!(parse_env_bool("YES", "K").unwrap());
        assert!(!parse_env_bool("off", "K").unwrap());
        assert!(parse_env_bool("maybe", "K").is_err());
    }
}
