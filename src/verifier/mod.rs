//! Verification of a working copy: test runner, linter and text matcher,
//! combined into a single base score.
//!
//! Checkers never fail the episode. A [`VerificationError`] raised while
//! checking is logged and turned into a worst-case result.

pub mod aggregate;
pub mod linter;
pub mod test_runner;
pub mod text_matcher;

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VerificationError;
use crate::scenario::Scenario;

pub use aggregate::{regression_count, VerificationWeights};
pub use linter::Linter;
pub use test_runner::TestRunner;
pub use text_matcher::TextMatcher;

/// Default time limit for one verification command.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Test,
    Lint,
    TextMatch,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Test => "test",
            VerificationMethod::Lint => "lint",
            VerificationMethod::TextMatch => "text_match",
        }
    }
}

impl std::fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub method: VerificationMethod,
    /// Score in [0, 1].
    pub score: f64,
    pub pass_count: usize,
    pub fail_count: usize,
    pub total: usize,
    /// Names of passing items (test names for the test runner).
    pub passing: Vec<String>,
    pub failing: Vec<String>,
    /// Human-readable findings.
    pub details: Vec<String>,
    /// The tool was unavailable and the check did not run.
    pub skipped: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl VerificationResult {
    pub fn new(method: VerificationMethod) -> Self {
        Self {
            method,
            score: 0.0,
            pass_count: 0,
            fail_count: 0,
            total: 0,
            passing: Vec::new(),
            failing: Vec::new(),
            details: Vec::new(),
            skipped: false,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Result used when a checker could not produce a verdict.
    pub fn worst_case(method: VerificationMethod, expected: &[String], error: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            fail_count: expected.len(),
            total: expected.len(),
            failing: expected.to_vec(),
            error: Some(error.into()),
            ..Self::new(method)
        }
    }

    /// Result for a check whose tool is not installed.
    pub fn skipped(method: VerificationMethod, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            score: 1.0,
            skipped: true,
            details: vec![reason],
            ..Self::new(method)
        }
    }

    pub fn all_passed(&self) -> bool {
        self.fail_count == 0 && self.error.is_none()
    }
}

// ============================================================================
// Checkers
// ============================================================================

/// The closed set of checks run against a working copy.
#[derive(Debug, Clone)]
pub enum Checker {
    Test(TestRunner),
    Lint(Linter),
    TextMatch(TextMatcher),
}

impl Checker {
    pub fn method(&self) -> VerificationMethod {
        match self {
            Checker::Test(_) => VerificationMethod::Test,
            Checker::Lint(_) => VerificationMethod::Lint,
            Checker::TextMatch(_) => VerificationMethod::TextMatch,
        }
    }

    fn expected_items(&self) -> Vec<String> {
        match self {
            Checker::Test(runner) => runner.spec().test_names.clone(),
            Checker::Lint(linter) => linter.spec().files.clone(),
            Checker::TextMatch(_) => Vec::new(),
        }
    }

    /// Runs the check; errors become a worst-case result.
    pub async fn check(&self, working_dir: &Path) -> VerificationResult {
        let started = Instant::now();
        let outcome: Result<VerificationResult, VerificationError> = match self {
            Checker::Test(runner) => runner.run(working_dir).await,
            Checker::Lint(linter) => linter.run(working_dir).await,
            Checker::TextMatch(matcher) => matcher.run(working_dir),
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("{} check failed: {}", self.method(), e);
                VerificationResult::worst_case(self.method(), &self.expected_items(), e.to_string())
            }
        };
        result.duration = started.elapsed();
        result
    }
}

// ============================================================================
// Suite
// ============================================================================

/// Results of every checker plus the weighted base score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub results: Vec<VerificationResult>,
    pub base_score: f64,
}

impl SuiteReport {
    pub fn get(&self, method: VerificationMethod) -> Option<&VerificationResult> {
        self.results.iter().find(|r| r.method == method)
    }

    pub fn tests(&self) -> Option<&VerificationResult> {
        self.get(VerificationMethod::Test)
    }

    /// Every expected test passes.
    pub fn solved(&self) -> bool {
        self.tests()
            .map_or(false, |t| t.total > 0 && t.all_passed())
    }
}

/// Runs all checkers for one scenario.
#[derive(Debug, Clone)]
pub struct VerifierSuite {
    checkers: Vec<Checker>,
    weights: VerificationWeights,
}

impl VerifierSuite {
    pub fn new(checkers: Vec<Checker>) -> Self {
        Self {
            checkers,
            weights: VerificationWeights::default(),
        }
    }

    /// Test, lint and text checks for `scenario`, each command bounded by `timeout`.
    pub fn for_scenario(scenario: &Scenario, timeout: Duration) -> Self {
        Self::new(vec![
            Checker::Test(TestRunner::new(scenario.test_spec.clone()).with_timeout(timeout)),
            Checker::Lint(Linter::new(scenario.lint_spec.clone()).with_timeout(timeout)),
            Checker::TextMatch(TextMatcher::new(scenario.text_match_spec.clone())),
        ])
    }

    pub fn with_weights(mut self, weights: VerificationWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn weights(&self) -> &VerificationWeights {
        &self.weights
    }

    pub fn checkers(&self) -> &[Checker] {
        &self.checkers
    }

    /// Runs every checker in order and aggregates.
    pub async fn verify(&self, working_dir: &Path) -> SuiteReport {
        let mut results = Vec::with_capacity(self.checkers.len());
        for checker in &self.checkers {
            results.push(checker.check(working_dir).await);
        }
        let base_score = self.weights.aggregate(&results);
        if let Some(tests) = results.iter().find(|r| r.method == VerificationMethod::Test) {
            info!(
                "Verification: {}/{} tests passing, base score {:.3}",
                tests.pass_count, tests.total, base_score
            );
        }
        SuiteReport { results, base_score }
    }

    /// Runs only the test checker; `None` when the suite has none.
    pub async fn run_tests(&self, working_dir: &Path) -> Option<VerificationResult> {
        for checker in &self.checkers {
            if let Checker::Test(_) = checker {
                return Some(checker.check(working_dir).await);
            }
        }
        None
    }
}
