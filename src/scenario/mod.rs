//! Scenario model: a buggy project plus its golden reference and the specs
//! the verifiers score it against.

pub mod builder;
pub mod injector;
pub mod syntax;
pub mod templates;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::difficulty::{DifficultyLevel, Language};

pub use builder::{ScenarioBuilder, DEFAULT_BUILD_ATTEMPTS};
pub use injector::{BugCatalog, BugInjector, BugTransform, InjectionOutcome, InjectionSite};
pub use syntax::{InterpreterCheck, StructuralCheck, SyntaxCheck};
pub use templates::ProjectTemplate;

/// Category of an injected defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugKind {
    OffByOne,
    WrongOperator,
    SwappedArgs,
    MissingEdgeCase,
    WrongConstant,
}

impl BugKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BugKind::OffByOne => "off_by_one",
            BugKind::WrongOperator => "wrong_operator",
            BugKind::SwappedArgs => "swapped_args",
            BugKind::MissingEdgeCase => "missing_edge_case",
            BugKind::WrongConstant => "wrong_constant",
        }
    }
}

impl std::fmt::Display for BugKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One injected defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    pub file: String,
    /// One-based line number.
    pub line: usize,
    pub function: String,
    pub kind: BugKind,
    /// Catalog transform that produced the bug.
    pub transform: String,
    pub original_snippet: String,
    pub injected_snippet: String,
}

/// How to run the scenario's tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub language: Language,
    pub test_file: String,
    /// Program and arguments, run from the project root.
    pub command: Vec<String>,
    /// Every test the file defines.
    pub test_names: Vec<String>,
}

impl TestSpec {
    pub fn for_file(language: Language, test_file: &str, test_names: Vec<String>) -> Self {
        let command = match language {
            Language::Python => vec![
                "python3".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-v".to_string(),
                "--tb=short".to_string(),
                "-p".to_string(),
                "no:cacheprovider".to_string(),
                test_file.to_string(),
            ],
            Language::JavaScript => vec!["node".to_string(), test_file.to_string()],
        };
        Self {
            language,
            test_file: test_file.to_string(),
            command,
            test_names,
        }
    }

    pub fn total(&self) -> usize {
        self.test_names.len()
    }
}

/// Files the linter checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintSpec {
    pub language: Language,
    pub files: Vec<String>,
    /// Error count at which the lint score reaches zero.
    pub error_cap: usize,
}

/// A single text-matching condition over one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextCondition {
    /// `pattern` must match somewhere in the file.
    Required { file: String, pattern: String },
    /// `pattern` must not match anywhere in the file.
    Forbidden { file: String, pattern: String },
    /// Whole file must equal `content` (trailing whitespace ignored).
    Exact { file: String, content: String },
    /// Line count within `tolerance` of `expected`.
    LineCount {
        file: String,
        expected: usize,
        tolerance: usize,
    },
}

impl TextCondition {
    pub fn file(&self) -> &str {
        match self {
            TextCondition::Required { file, .. }
            | TextCondition::Forbidden { file, .. }
            | TextCondition::Exact { file, .. }
            | TextCondition::LineCount { file, .. } => file,
        }
    }
}

/// Conditions checked by the text matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatchSpec {
    pub conditions: Vec<TextCondition>,
}

/// A generated buggy project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    pub template: String,
    pub language: Language,
    pub difficulty: DifficultyLevel,
    pub seed: u64,
    /// Project files as handed to the agent.
    pub files: BTreeMap<String, String>,
    pub bug_records: Vec<BugRecord>,
    pub test_spec: TestSpec,
    pub lint_spec: LintSpec,
    pub text_match_spec: TextMatchSpec,
    pub command_budget: u32,
    pub expected_commands: u32,
    /// SHA-256 over the buggy file set.
    pub fingerprint: String,
    #[serde(skip)]
    pub(crate) golden_files: BTreeMap<String, String>,
    #[serde(skip)]
    pub(crate) summary: String,
}

/// Stable scenario metadata for external prompt generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub language: Language,
    pub difficulty: DifficultyLevel,
    pub template: String,
    pub files: Vec<String>,
    pub source_files: Vec<String>,
    pub test_file: String,
    pub bug_count: usize,
    pub bug_kinds: Vec<BugKind>,
    pub test_command: String,
    pub command_budget: u32,
}

impl Scenario {
    /// Bug-free contents, used only for verification baselining.
    pub fn golden_files(&self) -> &BTreeMap<String, String> {
        &self.golden_files
    }

    pub fn bug_count(&self) -> usize {
        self.bug_records.len()
    }

    pub fn text_fields(&self) -> TaskFields {
        let mut bug_kinds: Vec<BugKind> = Vec::new();
        for record in &self.bug_records {
            if !bug_kinds.contains(&record.kind) {
                bug_kinds.push(record.kind);
            }
        }
        TaskFields {
            language: self.language,
            difficulty: self.difficulty,
            template: self.template.clone(),
            files: self.files.keys().cloned().collect(),
            source_files: self.lint_spec.files.clone(),
            test_file: self.test_spec.test_file.clone(),
            bug_count: self.bug_count(),
            bug_kinds,
            test_command: self.test_spec.command.join(" "),
            command_budget: self.command_budget,
        }
    }

    /// Placeholder task text; real prompts are rendered from [`Scenario::text_fields`].
    pub fn task_description(&self) -> String {
        let fields = self.text_fields();
        let subject = if self.summary.is_empty() {
            format!("the {} project", self.template)
        } else {
            self.summary.clone()
        };
        format!(
            "Fix {} bug(s) in {} ({}). Source: {}. Tests: `{}`. You have {} commands.",
            fields.bug_count,
            subject,
            fields.language,
            fields.source_files.join(", "),
            fields.test_command,
            fields.command_budget
        )
    }

    /// Render of the project as `Files:` followed by one `  - path (N bytes)` per file.
    pub fn file_tree(&self) -> String {
        render_file_tree(self.files.iter().map(|(p, c)| (p.as_str(), c.len())))
    }
}

pub(crate) fn render_file_tree<'a>(entries: impl Iterator<Item = (&'a str, usize)>) -> String {
    let mut out = String::from("Files:");
    for (path, size) in entries {
        out.push_str(&format!("\n  - {} ({} bytes)", path, size));
    }
    out
}

/// Deterministic scenario id.
pub fn scenario_id(template: &str, language: Language, difficulty: DifficultyLevel, seed: u64) -> Uuid {
    let name = format!("{}:{}:{}:{}", template, language, difficulty, seed);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// SHA-256 over sorted `path\0content\0` entries.
pub fn fingerprint(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_scenario_id_deterministic() {
        let a = scenario_id("loops", Language::Python, DifficultyLevel::Easy, 7);
        let b = scenario_id("loops", Language::Python, DifficultyLevel::Easy, 7);
        let c = scenario_id("loops", Language::Python, DifficultyLevel::Easy, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = fingerprint(&files(&[("a.py", "x = 1\n")]));
        let b = fingerprint(&files(&[("a.py", "x = 2\n")]));
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(&files(&[("a.py", "x = 1\n")])));
    }

    #[test]
    fn test_file_tree_format() {
        let tree = render_file_tree(vec![("main.py", 12), ("test_main.py", 30)].into_iter());
        assert_eq!(tree, "Files:\n  - main.py (12 bytes)\n  - test_main.py (30 bytes)");
    }

    #[test]
    fn test_python_test_spec_command() {
        let spec = TestSpec::for_file(Language::Python, "test_main.py", vec!["test_a".into()]);
        assert_eq!(spec.command[0], "python3");
        assert_eq!(spec.command.last().map(String::as_str), Some("test_main.py"));
        assert_eq!(spec.total(), 1);

        let js = TestSpec::for_file(Language::JavaScript, "test_utils.js", vec![]);
        assert_eq!(js.command, vec!["node", "test_utils.js"]);
    }

    #[test]
    fn test_text_condition_serde_tagged() {
        let cond = TextCondition::Required {
            file: "main.py".into(),
            pattern: "range".into(),
        };
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "required");
        assert_eq!(cond.file(), "main.py");
    }
}
