//! Static checks over the scenario's source files.
//!
//! Python uses pyflakes when installed and falls back to `py_compile`;
//! JavaScript uses `node --check`. A missing tool skips the check.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::difficulty::Language;
use crate::error::VerificationError;
use crate::executor::process::{run_process, ProcessOutput, ProcessSpec, NOT_FOUND_EXIT_CODE};
use crate::executor::sandbox::sandbox_env;
use crate::scenario::LintSpec;

use super::{VerificationMethod, VerificationResult, DEFAULT_VERIFY_TIMEOUT};

/// Default number of lint errors at which the score reaches zero.
pub const DEFAULT_LINT_ERROR_CAP: usize = 10;

fn location_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+?):(\d+):").expect("valid lint location regex"))
}

#[derive(Debug, Clone)]
pub struct Linter {
    spec: LintSpec,
    timeout: Duration,
}

/// One finding, attributed to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Finding {
    file: String,
    message: String,
}

impl Linter {
    pub fn new(spec: LintSpec) -> Self {
        Self {
            spec,
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spec(&self) -> &LintSpec {
        &self.spec
    }

    /// `1 - min(errors, cap) / cap`.
    pub fn score(errors: usize, cap: usize) -> f64 {
        let cap = cap.max(1);
        1.0 - errors.min(cap) as f64 / cap as f64
    }

    pub async fn run(&self, working_dir: &Path) -> Result<VerificationResult, VerificationError> {
        let findings = match self.spec.language {
            Language::Python => self.lint_python(working_dir).await?,
            Language::JavaScript => self.lint_javascript(working_dir).await?,
        };
        let Some(findings) = findings else {
            return Ok(VerificationResult::skipped(
                VerificationMethod::Lint,
                format!("no linter available for {}", self.spec.language),
            ));
        };

        let mut result = VerificationResult::new(VerificationMethod::Lint);
        result.total = self.spec.files.len();
        for file in &self.spec.files {
            if findings.iter().any(|f| &f.file == file) {
                result.failing.push(file.clone());
            } else {
                result.passing.push(file.clone());
            }
        }
        result.pass_count = result.passing.len();
        result.fail_count = findings.len();
        result.details = findings.into_iter().map(|f| f.message).collect();
        result.score = Self::score(result.fail_count, self.spec.error_cap);
        debug!("Lint: {} finding(s), score {:.2}", result.fail_count, result.score);
        Ok(result)
    }

    async fn exec(&self, working_dir: &Path, program: &str, args: Vec<String>) -> Result<ProcessOutput, VerificationError> {
        let spec = ProcessSpec::new(program, working_dir)
            .with_args(args)
            .with_env(sandbox_env(working_dir, working_dir))
            .with_timeout(self.timeout);
        let output = run_process(spec).await?;
        if output.timed_out {
            return Err(VerificationError::Timeout(self.timeout.as_secs()));
        }
        Ok(output)
    }

    /// `None` when neither pyflakes nor python3 is usable.
    async fn lint_python(&self, working_dir: &Path) -> Result<Option<Vec<Finding>>, VerificationError> {
        let mut args = vec!["-m".to_string(), "pyflakes".to_string()];
        args.extend(self.spec.files.iter().cloned());
        let output = self.exec(working_dir, "python3", args).await?;
        if output.exit_code == NOT_FOUND_EXIT_CODE {
            return Ok(None);
        }
        if !output.stderr.contains("No module named pyflakes") {
            return Ok(Some(self.parse_findings(&output)));
        }

        debug!("pyflakes not installed, falling back to py_compile");
        let mut findings = Vec::new();
        for file in &self.spec.files {
            let args = vec!["-m".to_string(), "py_compile".to_string(), file.clone()];
            let output = self.exec(working_dir, "python3", args).await?;
            if output.exit_code != 0 {
                findings.push(Finding {
                    file: file.clone(),
                    message: first_meaningful_line(&output.stderr, file),
                });
            }
        }
        Ok(Some(findings))
    }

    async fn lint_javascript(&self, working_dir: &Path) -> Result<Option<Vec<Finding>>, VerificationError> {
        let mut findings = Vec::new();
        for file in &self.spec.files {
            let output = self
                .exec(working_dir, "node", vec!["--check".to_string(), file.clone()])
                .await?;
            if output.exit_code == NOT_FOUND_EXIT_CODE {
                return Ok(None);
            }
            if output.exit_code != 0 {
                findings.push(Finding {
                    file: file.clone(),
                    message: first_meaningful_line(&output.stderr, file),
                });
            }
        }
        Ok(Some(findings))
    }

    /// pyflakes reports one `file:line:...` message per finding; syntax errors
    /// go to stderr with context lines.
    fn parse_findings(&self, output: &ProcessOutput) -> Vec<Finding> {
        let mut findings: Vec<Finding> = Vec::new();
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            if let Some(cap) = location_line().captures(line) {
                let file = cap[1].trim_start_matches("./").to_string();
                findings.push(Finding {
                    file,
                    message: line.trim().to_string(),
                });
            }
        }
        if findings.is_empty() && output.exit_code != 0 {
            let file = self.spec.files.first().cloned().unwrap_or_default();
            findings.push(Finding {
                message: first_meaningful_line(&output.stderr, &file),
                file,
            });
        }
        findings
    }
}

fn first_meaningful_line(text: &str, file: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| l.contains("Error") || l.contains(file))
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()))
        .map_or_else(|| format!("{}: lint error", file), |l| l.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(language: Language, files: &[&str]) -> LintSpec {
        LintSpec {
            language,
            files: files.iter().map(|f| f.to_string()).collect(),
            error_cap: DEFAULT_LINT_ERROR_CAP,
        }
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(Linter::score(0, 10), 1.0);
        assert!((Linter::score(3, 10) - 0.7).abs() < 1e-9);
        assert_eq!(Linter::score(25, 10), 0.0);
        assert_eq!(Linter::score(1, 0), 0.0);
    }

    #[test]
    fn test_parse_pyflakes_output() {
        let linter = Linter::new(spec(Language::Python, &["main.py", "util.py"]));
        let output = ProcessOutput {
            stdout: "main.py:3:1: 'os' imported but unused\nmain.py:9:5: undefined name 'y'\n".to_string(),
            stderr: String::new(),
            exit_code: 1,
            timed_out: false,
            truncated: false,
            duration: Duration::ZERO,
        };
        let findings = linter.parse_findings(&output);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.file == "main.py"));
    }

    #[test]
    fn test_first_meaningful_line() {
        let stderr = "  File \"main.py\", line 2\n    def f(\n         ^\nSyntaxError: '(' was never closed\n";
        assert_eq!(first_meaningful_line(stderr, "main.py"), "File \"main.py\", line 2");
        assert_eq!(first_meaningful_line("", "a.js"), "a.js: lint error");
    }

    #[tokio::test]
    #[ignore = "requires python3"]
    async fn test_python_syntax_error_is_a_finding() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "def f(:\n    return 1\n").unwrap();
        std::fs::write(dir.path().join("ok.py"), "def g():\n    return 1\n").unwrap();
        let result = Linter::new(spec(Language::Python, &["main.py", "ok.py"]))
            .run(dir.path())
            .await
            .unwrap();
        assert!(result.fail_count >= 1);
        assert!(result.score < 1.0);
        assert_eq!(result.passing, vec!["ok.py".to_string()]);
    }
}
