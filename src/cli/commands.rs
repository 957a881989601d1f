//! CLI command definitions for cli-rl-env.
//!
//! Three subcommands cover the engine from the shell: `scenario` builds and
//! exports a buggy project, `check` runs command strings through the
//! whitelist filter, and `run` plays one reset/step episode.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;

use crate::difficulty::{DifficultyLevel, LanguageChoice};
use crate::episode::{Action, EngineConfig, EpisodeEngine};
use crate::executor::CommandFilter;
use crate::scenario::{Scenario, ScenarioBuilder};

/// Default number of seconds the agent claims its commands take.
const DEFAULT_TIME_ESTIMATE: f64 = 30.0;

/// Bug-fixing episodes for training and evaluating command-line agents.
#[derive(Parser)]
#[command(name = "cli-rl-env")]
#[command(about = "Bug-fixing episodes for training and evaluating command-line agents")]
#[command(version)]
#[command(
    long_about = "cli-rl-env builds small buggy projects, runs agent commands in a sandbox and scores the result.\n\nExample usage:\n  cli-rl-env scenario --difficulty medium --seed 42\n  cli-rl-env run --seed 42 --command 'cat main.py' --command 'python3 -m pytest -q'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Build a scenario and print its summary.
    #[command(alias = "build")]
    Scenario(ScenarioArgs),

    /// Validate command strings against the whitelist.
    Check(CheckArgs),

    /// Reset an episode and run one step.
    Run(RunArgs),
}

/// Options shared by commands that build a scenario.
#[derive(clap::Args, Debug, Clone)]
pub struct ScenarioOptions {
    /// Difficulty level (easy, medium, hard, very_hard).
    #[arg(short, long)]
    pub difficulty: Option<DifficultyLevel>,

    /// Project language (python, javascript, random).
    #[arg(short = 'L', long)]
    pub language: Option<LanguageChoice>,

    /// Seed for template choice and bug injection.
    #[arg(short, long, default_value = "0")]
    pub seed: u64,

    /// Pin a project template by name.
    #[arg(short, long)]
    pub template: Option<String>,

    /// Check the scenario against its tests before accepting it (needs the toolchain).
    #[arg(long)]
    pub verify: bool,

    /// YAML configuration file. Defaults to CLI_RL_ENV_* environment variables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `cli-rl-env scenario`.
#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    #[command(flatten)]
    pub options: ScenarioOptions,

    /// Write the project files into this directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write the bug-free files under `<output-dir>/golden`.
    #[arg(long, requires = "output_dir")]
    pub with_golden: bool,

    /// Print the full scenario (bug records, specs) instead of the summary.
    #[arg(long)]
    pub full: bool,
}

/// Arguments for `cli-rl-env check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Command strings to validate.
    #[arg(required = true)]
    pub commands: Vec<String>,
}

/// Arguments for `cli-rl-env run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub options: ScenarioOptions,

    /// Action as JSON: {"commands": [...], "time_estimate": n}.
    #[arg(short, long, conflicts_with = "commands")]
    pub action: Option<String>,

    /// A command to run; repeat for several.
    #[arg(long = "command", value_name = "COMMAND")]
    pub commands: Vec<String>,

    /// Agent's time estimate in seconds, used with --command.
    #[arg(long, default_value_t = DEFAULT_TIME_ESTIMATE)]
    pub time_estimate: f64,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
///
/// Use `parse_cli()` and `run_with_cli()` to initialize logging in between.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Scenario(args) => {
            run_scenario_command(args).await?;
        }
        Commands::Check(args) => {
            run_check_command(args)?;
        }
        Commands::Run(args) => {
            run_episode_command(args).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

fn load_config(options: &ScenarioOptions) -> anyhow::Result<EngineConfig> {
    let mut config = match &options.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::from_env().context("Invalid CLI_RL_ENV_* environment")?,
    };
    if let Some(difficulty) = options.difficulty {
        config = config.with_difficulty(difficulty);
    }
    if let Some(language) = options.language {
        config = config.with_language(language);
    }
    if let Some(template) = &options.template {
        config = config.with_template(template.clone());
    }
    if options.verify {
        config.verify_scenarios = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// ============================================================================
// scenario
// ============================================================================

async fn run_scenario_command(args: ScenarioArgs) -> anyhow::Result<()> {
    let config = load_config(&args.options)?;
    let mut builder = ScenarioBuilder::new()
        .with_max_attempts(config.build_retries)
        .with_lint_error_cap(config.lint_error_cap)
        .with_test_timeout(config.verify_timeout());
    if let Some(template) = &config.template {
        builder = builder.with_template(template.clone());
    }

    let seed = args.options.seed;
    let scenario = if config.verify_scenarios {
        builder
            .build_verified(config.language, config.difficulty, seed)
            .await
            .context("Failed to build a verified scenario")?
    } else {
        builder
            .build(config.language, config.difficulty, seed)
            .context("Failed to build scenario")?
    };

    if let Some(dir) = &args.output_dir {
        write_files(dir, &scenario.files)?;
        if args.with_golden {
            write_files(&dir.join("golden"), scenario.golden_files())?;
        }
        info!(dir = %dir.display(), files = scenario.files.len(), "Scenario files written");
    }

    let output = if args.full {
        serde_json::to_string_pretty(&scenario)?
    } else {
        serde_json::to_string_pretty(&scenario_overview(&scenario))?
    };
    println!("{}", output);
    Ok(())
}

fn scenario_overview(scenario: &Scenario) -> serde_json::Value {
    json!({
        "scenario_id": scenario.id,
        "template": scenario.template,
        "language": scenario.language,
        "difficulty": scenario.difficulty,
        "seed": scenario.seed,
        "fingerprint": scenario.fingerprint,
        "task_description": scenario.task_description(),
        "file_tree": scenario.file_tree(),
        "bugs": scenario.bug_records.iter().map(|b| json!({
            "file": b.file,
            "line": b.line,
            "function": b.function,
            "kind": b.kind,
        })).collect::<Vec<_>>(),
        "test_command": scenario.test_spec.command.join(" "),
        "command_budget": scenario.command_budget,
        "expected_commands": scenario.expected_commands,
    })
}

fn write_files(dir: &Path, files: &std::collections::BTreeMap<String, String>) -> anyhow::Result<()> {
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

// ============================================================================
// check
// ============================================================================

fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let report = check_commands(&CommandFilter::new(), &args.commands);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_commands(filter: &CommandFilter, commands: &[String]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = commands
        .iter()
        .map(|command| match filter.validate(command) {
            Ok(parsed) => json!({
                "command": command,
                "accepted": true,
                "parsed": parsed,
            }),
            Err(rejected) => json!({
                "command": command,
                "accepted": false,
                "reason": rejected.reason,
                "message": rejected.message,
            }),
        })
        .collect();
    serde_json::Value::Array(entries)
}

// ============================================================================
// run
// ============================================================================

async fn run_episode_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.options)?;
    let (difficulty, language) = (config.difficulty, config.language);
    let mut engine = EpisodeEngine::new(config).context("Invalid engine configuration")?;

    let summary = engine
        .reset(args.options.seed, difficulty, language)
        .await
        .context("Failed to reset episode")?;
    info!(
        scenario = %summary.scenario_id,
        template = %summary.template,
        budget = summary.command_budget,
        "Episode ready"
    );

    let outcome = match &args.action {
        Some(raw) => engine.step_json(raw).await?,
        None => {
            engine
                .step(Action::new(args.commands.clone(), args.time_estimate))
                .await?
        }
    };
    engine.close();

    let output = json!({
        "scenario": summary,
        "outcome": outcome,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scenario_command_defaults() {
        let cli = Cli::try_parse_from(["cli-rl-env", "scenario"]).expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Scenario(args) => {
                assert_eq!(args.options.seed, 0);
                assert!(args.options.difficulty.is_none());
                assert!(args.options.language.is_none());
                assert!(!args.options.verify);
                assert!(args.output_dir.is_none());
                assert!(!args.with_golden);
            }
            _ => panic!("Expected Scenario command"),
        }
    }

    #[test]
    fn test_scenario_command_with_options() {
        let cli = Cli::try_parse_from([
            "cli-rl-env",
            "build",
            "-d",
            "very_hard",
            "-L",
            "javascript",
            "-s",
            "42",
            "-t",
            "utils",
            "-o",
            "./out",
            "--with-golden",
            "--log-level",
            "debug",
        ])
        .expect("should parse with alias");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Scenario(args) => {
                assert_eq!(args.options.difficulty, Some(DifficultyLevel::VeryHard));
                assert_eq!(args.options.language, Some(LanguageChoice::JavaScript));
                assert_eq!(args.options.seed, 42);
                assert_eq!(args.options.template.as_deref(), Some("utils"));
                assert_eq!(args.output_dir, Some(PathBuf::from("./out")));
                assert!(args.with_golden);
            }
            _ => panic!("Expected Scenario command"),
        }
    }

    #[test]
    fn test_with_golden_requires_output_dir() {
        assert!(Cli::try_parse_from(["cli-rl-env", "scenario", "--with-golden"]).is_err());
    }

    #[test]
    fn test_invalid_difficulty_rejected() {
        assert!(Cli::try_parse_from(["cli-rl-env", "scenario", "-d", "impossible"]).is_err());
    }

    #[test]
    fn test_run_command_repeated_commands() {
        let cli = Cli::try_parse_from([
            "cli-rl-env",
            "run",
            "--command",
            "cat main.py",
            "--command",
            "ls -la",
            "--time-estimate",
            "12.5",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.commands, vec!["cat main.py", "ls -la"]);
                assert_eq!(args.time_estimate, 12.5);
                assert!(args.action.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_action_conflicts_with_commands() {
        let result = Cli::try_parse_from([
            "cli-rl-env",
            "run",
            "--action",
            r#"{"commands": [], "time_estimate": 1}"#,
            "--command",
            "ls",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_requires_commands() {
        assert!(Cli::try_parse_from(["cli-rl-env", "check"]).is_err());
    }

    #[test]
    fn test_check_commands_report() {
        let report = check_commands(
            &CommandFilter::new(),
            &["cat main.py".to_string(), "rm -rf /".to_string()],
        );
        assert_eq!(report[0]["accepted"], true);
        assert_eq!(report[0]["parsed"]["program"], "cat");
        assert_eq!(report[1]["accepted"], false);
        assert!(report[1]["reason"].is_string());
    }

    #[test]
    fn test_write_files_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = std::collections::BTreeMap::new();
        files.insert("src/lib/util.py".to_string(), "x = 1\n".to_string());
        write_files(dir.path(), &files).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("src/lib/util.py")).unwrap(),
            "x = 1\n"
        );
    }

    #[test]
    fn test_scenario_overview_fields() {
        let scenario = ScenarioBuilder::new()
            .build(LanguageChoice::Python, DifficultyLevel::Easy, 3)
            .unwrap();
        let overview = scenario_overview(&scenario);
        assert_eq!(overview["bugs"].as_array().unwrap().len(), 1);
        assert_eq!(overview["command_budget"], 5);
        assert!(overview["test_command"].as_str().unwrap().contains("pytest"));
    }
}
