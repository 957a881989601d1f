//! Pattern and content conditions over files in the working copy.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::VerificationError;
use crate::scenario::{TextCondition, TextMatchSpec};

use super::{VerificationMethod, VerificationResult};

#[derive(Debug, Clone)]
pub struct TextMatcher {
    spec: TextMatchSpec,
}

impl TextMatcher {
    pub fn new(spec: TextMatchSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TextMatchSpec {
        &self.spec
    }

    /// Evaluates every condition. The rate is matched/total, or 1.0 when
    /// there are no conditions.
    pub fn run(&self, working_dir: &Path) -> Result<VerificationResult, VerificationError> {
        let mut result = VerificationResult::new(VerificationMethod::TextMatch);
        result.total = self.spec.conditions.len();

        for condition in &self.spec.conditions {
            let content = read_optional(&working_dir.join(condition.file()))?;
            let (ok, label) = evaluate(condition, content.as_deref());
            if ok {
                result.passing.push(label);
            } else {
                result.details.push(format!("unmet: {}", label));
                result.failing.push(label);
            }
        }

        result.pass_count = result.passing.len();
        result.fail_count = result.failing.len();
        result.score = if result.total == 0 {
            1.0
        } else {
            result.pass_count as f64 / result.total as f64
        };
        Ok(result)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, VerificationError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        // A file the agent made unreadable counts as absent.
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Regex search, or a literal search when `pattern` is not a valid regex.
pub fn pattern_matches(pattern: &str, content: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(content),
        Err(_) => content.contains(pattern),
    }
}

fn evaluate(condition: &TextCondition, content: Option<&str>) -> (bool, String) {
    match condition {
        TextCondition::Required { file, pattern } => (
            content.map_or(false, |c| pattern_matches(pattern, c)),
            format!("{} contains /{}/", file, pattern),
        ),
        TextCondition::Forbidden { file, pattern } => (
            content.map_or(true, |c| !pattern_matches(pattern, c)),
            format!("{} does not contain /{}/", file, pattern),
        ),
        TextCondition::Exact { file, content: expected } => (
            content.map_or(false, |c| c.trim_end() == expected.trim_end()),
            format!("{} matches expected content", file),
        ),
        TextCondition::LineCount {
            file,
            expected,
            tolerance,
        } => (
            content.map_or(false, |c| c.lines().count().abs_diff(*expected) <= *tolerance),
            format!("{} has {}±{} lines", file, expected, tolerance),
        ),
    }
}
