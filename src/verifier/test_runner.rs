//! Runs the scenario's test file and reports per-test outcomes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::difficulty::Language;
use crate::error::VerificationError;
use crate::executor::process::{run_process, ProcessSpec, DEFAULT_OUTPUT_CAP, NOT_FOUND_EXIT_CODE};
use crate::executor::sandbox::sandbox_env;
use crate::scenario::TestSpec;

use super::{VerificationMethod, VerificationResult, DEFAULT_VERIFY_TIMEOUT};

fn pytest_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:\S+::)?(\w+)(?:\[[^\]]*\])?\s+(PASSED|FAILED|ERROR)\b")
            .expect("valid pytest regex")
    })
}

fn node_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(PASS|FAIL)\s+(\w+)").expect("valid node regex"))
}

/// Parses runner output into `test name -> passed`. A test reported more
/// than once passes only if every report passed.
pub fn parse_outcomes(language: Language, output: &str) -> BTreeMap<String, bool> {
    let mut outcomes: BTreeMap<String, bool> = BTreeMap::new();
    let mut record = |name: &str, passed: bool| {
        outcomes
            .entry(name.to_string())
            .and_modify(|p| *p = *p && passed)
            .or_insert(passed);
    };
    match language {
        Language::Python => {
            for cap in pytest_line().captures_iter(output) {
                record(&cap[1], &cap[2] == "PASSED");
            }
        }
        Language::JavaScript => {
            for cap in node_line().captures_iter(output) {
                record(&cap[2], &cap[1] == "PASS");
            }
        }
    }
    outcomes
}

/// Runs the test command from the project root.
#[derive(Debug, Clone)]
pub struct TestRunner {
    spec: TestSpec,
    timeout: Duration,
    output_cap: usize,
}

impl TestRunner {
    pub fn new(spec: TestSpec) -> Self {
        Self {
            spec,
            timeout: DEFAULT_VERIFY_TIMEOUT,
            output_cap: DEFAULT_OUTPUT_CAP,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_cap(mut self, cap: usize) -> Self {
        self.output_cap = cap;
        self
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    pub async fn run(&self, working_dir: &Path) -> Result<VerificationResult, VerificationError> {
        let (program, args) = self
            .spec
            .command
            .split_first()
            .ok_or_else(|| VerificationError::MalformedOutput("empty test command".to_string()))?;

        let spec = ProcessSpec::new(program, working_dir)
            .with_args(args.iter().cloned())
            .with_env(sandbox_env(working_dir, working_dir))
            .with_timeout(self.timeout)
            .with_output_cap(self.output_cap);
        let output = run_process(spec).await?;

        if output.timed_out {
            return Err(VerificationError::Timeout(self.timeout.as_secs()));
        }
        if output.exit_code == NOT_FOUND_EXIT_CODE && output.stdout.is_empty() {
            return Err(VerificationError::ToolUnavailable {
                tool: program.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }
        if output.stderr.contains("No module named pytest") {
            return Err(VerificationError::ToolUnavailable {
                tool: "pytest".to_string(),
                reason: "pytest is not installed".to_string(),
            });
        }

        let outcomes = parse_outcomes(self.spec.language, &output.stdout);
        if outcomes.is_empty() && output.exit_code != 0 {
            let tail: String = output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .filter(|l| !l.trim().is_empty())
                .last()
                .unwrap_or("no output")
                .to_string();
            return Err(VerificationError::MalformedOutput(format!(
                "no test results (exit {}): {}",
                output.exit_code, tail
            )));
        }

        let mut result = VerificationResult::new(VerificationMethod::Test);
        result.total = self.spec.total();
        for name in &self.spec.test_names {
            match outcomes.get(name) {
                Some(true) => result.passing.push(name.clone()),
                Some(false) => {
                    result.details.push(format!("{} failed", name));
                    result.failing.push(name.clone());
                }
                None => {
                    result.details.push(format!("{} did not run", name));
                    result.failing.push(name.clone());
                }
            }
        }
        result.pass_count = result.passing.len();
        result.fail_count = result.failing.len();
        result.score = if result.total == 0 {
            0.0
        } else {
            result.pass_count as f64 / result.total as f64
        };
        debug!(
            "Test run: {}/{} passed (exit {})",
            result.pass_count, result.total, output.exit_code
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pytest_verbose() {
        let output = "\
============================= test session starts ==============================
collected 3 items

test_main.py::test_add PASSED                                            [ 33%]
test_main.py::test_divide FAILED                                         [ 66%]
test_main.py::TestGroup::test_power PASSED                               [100%]

=========================== short test summary info ============================
FAILED test_main.py::test_divide - assert 2 == 3
";
        let outcomes = parse_outcomes(Language::Python, output);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes["test_add"], true);
        assert_eq!(outcomes["test_divide"], false);
        assert_eq!(outcomes["test_power"], true);
    }

    #[test]
    fn test_parse_pytest_teardown_error_fails_test() {
        let output = "test_main.py::test_a PASSED\ntest_main.py::test_a ERROR\n";
        let outcomes = parse_outcomes(Language::Python, output);
        assert_eq!(outcomes["test_a"], false);
    }

    #[test]
    fn test_parse_node_output() {
        let output = "PASS sum_array\nFAIL chunk: expected [[1,2]] got [[1]]\nPASS clamp\n";
        let outcomes = parse_outcomes(Language::JavaScript, output);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes["chunk"], false);
        assert_eq!(outcomes["clamp"], true);
    }

    #[tokio::test]
    async fn test_missing_runner_is_tool_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut spec = TestSpec::for_file(Language::JavaScript, "test.js", vec!["a".into()]);
        spec.command = vec!["no-such-test-runner-xyz".to_string()];
        let err = TestRunner::new(spec).run(dir.path()).await.unwrap_err();
        assert!(matches!(err, VerificationError::ToolUnavailable { .. }));
    }

    #[tokio::test]
    #[ignore = "requires node"]
    async fn test_node_runner_counts_missing_tests_as_failed() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("test.js"),
            "console.log('PASS one');\nconsole.log('FAIL two: nope');\nprocess.exit(1);\n",
        )
        .unwrap();
        let spec = TestSpec::for_file(
            Language::JavaScript,
            "test.js",
            vec!["one".into(), "two".into(), "three".into()],
        );
        let result = TestRunner::new(spec).run(dir.path()).await.unwrap();
        assert_eq!(result.pass_count, 1);
        assert_eq!(result.fail_count, 2);
        assert_eq!(result.passing, vec!["one".to_string()]);
    }
}
