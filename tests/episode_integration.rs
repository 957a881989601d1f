//! End-to-end episode tests.
//!
//! Tests that execute project test suites need `python3` with `pytest` (or
//! `node`) on PATH and are ignored by default:
//!
//! ```bash
//! cargo test --test episode_integration -- --ignored
//! ```

use cli_rl_env::difficulty::{DifficultyLevel, Language, LanguageChoice};
use cli_rl_env::episode::{Action, EngineConfig, EpisodeEngine};
use cli_rl_env::executor::REJECTED_EXIT_CODE;
use cli_rl_env::scenario::{BugCatalog, BugInjector, ScenarioBuilder};
use cli_rl_env::verifier::VerificationMethod;
use cli_rl_env::RejectReason;

/// Engine pinned to the `loops` template with only the loop-bound bug.
fn off_by_one_engine(max_steps: u32) -> EpisodeEngine {
    let builder = ScenarioBuilder::new()
        .with_template("loops")
        .with_injector(BugInjector::new().with_catalog(BugCatalog::python().only_named(&["range-bound"])));
    EpisodeEngine::new(EngineConfig::default().with_max_steps(max_steps))
        .expect("default config is valid")
        .with_builder(builder)
}

#[tokio::test]
async fn test_same_seed_same_scenario() {
    let mut a = EpisodeEngine::new(EngineConfig::default()).unwrap();
    let mut b = EpisodeEngine::new(EngineConfig::default()).unwrap();
    let first = a.reset(1234, DifficultyLevel::Hard, LanguageChoice::Random).await.unwrap();
    let second = b.reset(1234, DifficultyLevel::Hard, LanguageChoice::Random).await.unwrap();

    assert_eq!(first.scenario_id, second.scenario_id);
    assert_eq!(first.template, second.template);
    assert_eq!(first.file_tree, second.file_tree);
    assert_eq!(first.bug_count, 3);
    assert_eq!(
        a.scenario().unwrap().fingerprint,
        b.scenario().unwrap().fingerprint
    );
    a.close();
    b.close();
}

#[tokio::test]
async fn test_destructive_command_rejected() {
    let mut engine = off_by_one_engine(1);
    let summary = engine
        .reset(8, DifficultyLevel::Easy, LanguageChoice::Python)
        .await
        .unwrap();
    assert_eq!(summary.template, "loops");

    let outcome = engine
        .step(Action::new(["rm -rf /", "cat main.py"], 10.0))
        .await
        .unwrap();
    let rejected = &outcome.info.execution_results[0];
    assert_eq!(rejected.exit_code, REJECTED_EXIT_CODE);
    assert!(rejected.was_rejected());
    assert_ne!(rejected.rejected, Some(RejectReason::BudgetExceeded));

    let cat = &outcome.info.execution_results[1];
    assert_eq!(cat.exit_code, 0);
    assert!(cat.stdout.contains("def sum_to(n):"));
    assert!(outcome.terminated);
}

#[tokio::test]
async fn test_reward_always_bounded() {
    let mut engine = EpisodeEngine::new(EngineConfig::default()).unwrap();
    for seed in 0..4 {
        engine
            .reset(seed, DifficultyLevel::Medium, LanguageChoice::Random)
            .await
            .unwrap();
        let outcome = engine
            .step(Action::new(["ls", "echo hi > notes.txt", "wc -l notes.txt"], 0.0))
            .await
            .unwrap();
        assert!((0.0..=1.0).contains(&outcome.reward), "seed {}: {}", seed, outcome.reward);
        assert!(outcome.is_done());
    }
}

#[tokio::test]
#[ignore = "requires python3 with pytest"]
async fn test_off_by_one_fix_solves_episode() {
    let mut engine = off_by_one_engine(3);
    let summary = engine
        .reset(8, DifficultyLevel::Easy, LanguageChoice::Python)
        .await
        .unwrap();
    assert_eq!(summary.bug_count, 1);
    assert!(!summary.baseline_passing.contains(&"test_sum_to".to_string()));
    assert_eq!(summary.baseline_passing.len(), 4);

    let outcome = engine
        .step(Action::new(
            ["cat main.py", "sed -i 's/range(n)/range(n+1)/' main.py"],
            5.0,
        ))
        .await
        .unwrap();

    let tests = outcome
        .info
        .verification_results
        .iter()
        .find(|r| r.method == VerificationMethod::Test)
        .unwrap();
    assert_eq!(tests.fail_count, 0);
    assert_eq!(tests.pass_count, 5);
    assert!(outcome.info.solved);
    assert!(outcome.terminated);
    assert!(!outcome.truncated);
    assert_eq!(outcome.info.regression_count, 0);
    assert!((outcome.info.reward_breakdown.base_reward - 1.0).abs() < 1e-9);
    assert!((outcome.reward - 1.0).abs() < 1e-9);
}

#[tokio::test]
#[ignore = "requires python3 with pytest"]
async fn test_breaking_passing_test_counts_regression() {
    let mut engine = off_by_one_engine(3);
    engine
        .reset(8, DifficultyLevel::Easy, LanguageChoice::Python)
        .await
        .unwrap();

    let outcome = engine
        .step(Action::new(
            [
                "sed -i 's/range(n)/range(n+1)/' main.py",
                "sed -i 's/value % k == 0/value % k == 1/' main.py",
            ],
            60.0,
        ))
        .await
        .unwrap();

    assert!(!outcome.info.solved);
    assert_eq!(outcome.info.regression_count, 1);
    assert!(outcome.info.reward_breakdown.regression_score < 1.0);
    assert!(outcome.reward < outcome.info.reward_breakdown.base_reward);
    assert!(!outcome.terminated);
}

#[tokio::test]
#[ignore = "requires python3 with pytest"]
async fn test_verified_python_scenarios_every_difficulty() {
    for difficulty in DifficultyLevel::ALL {
        let mut config = EngineConfig::default().with_difficulty(difficulty);
        config.verify_scenarios = true;
        let mut engine = EpisodeEngine::new(config).unwrap();
        let summary = engine.reset_default(31).await.unwrap();

        assert_eq!(summary.language, Language::Python);
        assert_eq!(summary.bug_count, difficulty.bug_count());
        let total = engine.scenario().unwrap().test_spec.total();
        assert!(summary.baseline_passing.len() < total, "{:?}", difficulty);
        engine.close();
    }
}

#[tokio::test]
#[ignore = "requires node"]
async fn test_verified_javascript_scenario() {
    let mut config = EngineConfig::default()
        .with_difficulty(DifficultyLevel::Medium)
        .with_language(LanguageChoice::JavaScript);
    config.verify_scenarios = true;
    let mut engine = EpisodeEngine::new(config).unwrap();
    let summary = engine.reset_default(5).await.unwrap();
    assert_eq!(summary.language, Language::JavaScript);
    let total = engine.scenario().unwrap().test_spec.total();
    assert!(summary.baseline_passing.len() < total);
    engine.close();
}
