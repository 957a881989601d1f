//! Deterministic, syntax-preserving bug injection.
//!
//! A [`BugCatalog`] is plain data: a list of line-level regex rewrites per
//! language. The [`BugInjector`] enumerates every (line, transform) site in
//! function bodies, shuffles them with a `ChaCha8Rng` seeded by the caller,
//! and takes sites greedily while keeping at most one bug per line and per
//! function.

use std::collections::HashSet;
use std::sync::Arc;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use tracing::debug;

use super::syntax::{InterpreterCheck, SyntaxCheck};
use super::{BugKind, BugRecord};
use crate::difficulty::Language;
use crate::error::InjectionError;

/// One line-level rewrite.
#[derive(Debug, Clone)]
pub struct BugTransform {
    /// Short identifier, unique within a catalog.
    pub name: String,
    pub kind: BugKind,
    pattern: Regex,
    replacement: String,
}

impl BugTransform {
    /// Builds a transform; `replacement` may reference capture groups (`${1}`).
    pub fn new(
        name: impl Into<String>,
        kind: BugKind,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            kind,
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Rewrites the first match on `line`, or `None` if nothing changes.
    pub fn apply(&self, line: &str) -> Option<String> {
        if !self.pattern.is_match(line) {
            return None;
        }
        let rewritten = self
            .pattern
            .replacen(line, 1, self.replacement.as_str())
            .into_owned();
        (rewritten != line).then_some(rewritten)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

type TransformSpec = (&'static str, BugKind, &'static str, &'static str);

const PYTHON_TRANSFORMS: &[TransformSpec] = &[
    ("range-bound", BugKind::OffByOne, r"range\(([A-Za-z_]\w*)\s*\+\s*1\)", "range(${1})"),
    ("len-minus-one", BugKind::OffByOne, r"len\(([A-Za-z_]\w*)\)\s*-\s*1\b", "len(${1})"),
    ("inclusive-le", BugKind::OffByOne, r" <= ", " < "),
    ("inclusive-ge", BugKind::OffByOne, r" >= ", " > "),
    ("eq-flip", BugKind::WrongOperator, r" == ", " != "),
    ("gt-flip", BugKind::WrongOperator, r" > ", " < "),
    ("lt-flip", BugKind::WrongOperator, r" < ", " > "),
    ("add-sub", BugKind::WrongOperator, r" \+ ", " - "),
    ("sub-add", BugKind::WrongOperator, r" - ", " + "),
    ("mul-add", BugKind::WrongOperator, r" \* ", " + "),
    ("and-or", BugKind::WrongOperator, r" and ", " or "),
    (
        "swap-args",
        BugKind::SwappedArgs,
        r"\b([A-Za-z_]\w*)\(([A-Za-z_]\w*), ([A-Za-z_]\w*)\)",
        "${1}(${3}, ${2})",
    ),
    ("weak-guard", BugKind::MissingEdgeCase, r"if not ([A-Za-z_]\w*):", "if ${1} is None:"),
    ("sentinel-return", BugKind::WrongConstant, r"^(\s*)return -1$", "${1}return 0"),
];

const JAVASCRIPT_TRANSFORMS: &[TransformSpec] = &[
    ("inclusive-le", BugKind::OffByOne, r" <= ", " < "),
    ("inclusive-ge", BugKind::OffByOne, r" >= ", " > "),
    ("length-bound", BugKind::OffByOne, r" < ([\w.]+)\.length", " <= ${1}.length"),
    ("last-index", BugKind::OffByOne, r"\.length - 1\b", ".length"),
    ("eq-flip", BugKind::WrongOperator, r" === ", " !== "),
    ("gt-flip", BugKind::WrongOperator, r" > ", " < "),
    ("lt-flip", BugKind::WrongOperator, r" < ", " > "),
    ("add-sub", BugKind::WrongOperator, r" \+ ", " - "),
    ("sub-add", BugKind::WrongOperator, r" - ", " + "),
    ("mul-add", BugKind::WrongOperator, r" \* ", " + "),
    ("and-or", BugKind::WrongOperator, r" && ", " || "),
    (
        "swap-args",
        BugKind::SwappedArgs,
        r"\b([A-Za-z_]\w*)\(([A-Za-z_]\w*), ([A-Za-z_]\w*)\)",
        "${1}(${3}, ${2})",
    ),
    (
        "weak-guard",
        BugKind::MissingEdgeCase,
        r"if \(([A-Za-z_]\w*)\.length === 0\)",
        "if (${1} === null)",
    ),
    ("sentinel-return", BugKind::WrongConstant, r"return -1;", "return 0;"),
];

/// Language-specific list of bug transforms.
#[derive(Debug, Clone)]
pub struct BugCatalog {
    language: Language,
    transforms: Vec<BugTransform>,
}

impl BugCatalog {
    /// An empty catalog to be filled with [`BugCatalog::with_transform`].
    pub fn empty(language: Language) -> Self {
        Self {
            language,
            transforms: Vec::new(),
        }
    }

    /// The built-in catalog for `language`.
    pub fn for_language(language: Language) -> Self {
        let specs = match language {
            Language::Python => PYTHON_TRANSFORMS,
            Language::JavaScript => JAVASCRIPT_TRANSFORMS,
        };
        let transforms = specs
            .iter()
            .filter_map(|(name, kind, pattern, replacement)| {
                BugTransform::new(*name, *kind, pattern, *replacement).ok()
            })
            .collect();
        Self {
            language,
            transforms,
        }
    }

    pub fn python() -> Self {
        Self::for_language(Language::Python)
    }

    pub fn javascript() -> Self {
        Self::for_language(Language::JavaScript)
    }

    /// Adds a transform.
    pub fn with_transform(mut self, transform: BugTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Keeps only transforms whose name is in `names`.
    pub fn only_named(mut self, names: &[&str]) -> Self {
        self.transforms.retain(|t| names.contains(&t.name.as_str()));
        self
    }

    /// Keeps only transforms of the given kinds.
    pub fn only_kinds(mut self, kinds: &[BugKind]) -> Self {
        self.transforms.retain(|t| kinds.contains(&t.kind));
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn transforms(&self) -> &[BugTransform] {
        &self.transforms
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// A candidate injection site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionSite {
    /// Zero-based line index.
    pub line: usize,
    pub function: String,
    /// Index into the catalog's transforms.
    pub transform: usize,
}

/// Mutated source plus one record per injected bug, ordered by line.
#[derive(Debug, Clone)]
pub struct InjectionOutcome {
    pub mutated: String,
    pub records: Vec<BugRecord>,
}

/// Injects bugs using per-language catalogs and a pluggable syntax check.
#[derive(Clone)]
pub struct BugInjector {
    python: BugCatalog,
    javascript: BugCatalog,
    syntax: Arc<dyn SyntaxCheck>,
}

impl Default for BugInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BugInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugInjector")
            .field("python", &self.python.transforms.len())
            .field("javascript", &self.javascript.transforms.len())
            .finish()
    }
}

impl BugInjector {
    /// Built-in catalogs with the interpreter-backed syntax check.
    pub fn new() -> Self {
        Self {
            python: BugCatalog::python(),
            javascript: BugCatalog::javascript(),
            syntax: Arc::new(InterpreterCheck),
        }
    }

    /// Replaces the catalog for `catalog.language()`.
    pub fn with_catalog(mut self, catalog: BugCatalog) -> Self {
        match catalog.language() {
            Language::Python => self.python = catalog,
            Language::JavaScript => self.javascript = catalog,
        }
        self
    }

    pub fn with_syntax_check(mut self, check: Arc<dyn SyntaxCheck>) -> Self {
        self.syntax = check;
        self
    }

    pub fn catalog(&self, language: Language) -> &BugCatalog {
        match language {
            Language::Python => &self.python,
            Language::JavaScript => &self.javascript,
        }
    }

    /// Every (line, transform) pair that rewrites a line inside a function body.
    pub fn candidate_sites(&self, source: &str, language: Language) -> Vec<InjectionSite> {
        let catalog = self.catalog(language);
        let mut sites = Vec::new();
        for (line_idx, function, line) in function_body_lines(source, language) {
            for (t_idx, transform) in catalog.transforms().iter().enumerate() {
                if transform.apply(line).is_some() {
                    sites.push(InjectionSite {
                        line: line_idx,
                        function: function.clone(),
                        transform: t_idx,
                    });
                }
            }
        }
        sites
    }

    /// Upper bound on bugs this file can hold (one per function).
    pub fn capacity(&self, source: &str, language: Language) -> usize {
        self.candidate_sites(source, language)
            .into_iter()
            .map(|s| s.function)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Injects `bug_count` bugs into `source`.
    ///
    /// Identical inputs produce byte-identical output. `eligible` filters the
    /// functions a bug may land in (e.g. only those covered by tests).
    pub fn inject(
        &self,
        file: &str,
        source: &str,
        language: Language,
        bug_count: usize,
        rng_seed: u64,
        eligible: &dyn Fn(&str) -> bool,
    ) -> Result<InjectionOutcome, InjectionError> {
        let catalog = self.catalog(language);
        if catalog.is_empty() {
            return Err(InjectionError::EmptyCatalog(language.to_string()));
        }
        if self.syntax.check(language, source).is_err() {
            return Err(InjectionError::InvalidSource(file.to_string()));
        }

        let mut sites: Vec<InjectionSite> = self
            .candidate_sites(source, language)
            .into_iter()
            .filter(|s| eligible(&s.function))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
        sites.shuffle(&mut rng);

        let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
        let mut used_lines = HashSet::new();
        let mut used_functions = HashSet::new();
        let mut records = Vec::with_capacity(bug_count);

        for site in sites {
            if records.len() == bug_count {
                break;
            }
            if used_lines.contains(&site.line) || used_functions.contains(&site.function) {
                continue;
            }
            let transform = &catalog.transforms()[site.transform];
            let original = lines[site.line].clone();
            let Some(rewritten) = transform.apply(&original) else {
                continue;
            };

            lines[site.line] = rewritten.clone();
            if let Err(reason) = self.syntax.check(language, &lines.join("\n")) {
                debug!(
                    "Discarding {} at {}:{} ({})",
                    transform.name,
                    file,
                    site.line + 1,
                    reason
                );
                lines[site.line] = original;
                continue;
            }

            used_lines.insert(site.line);
            used_functions.insert(site.function.clone());
            records.push(BugRecord {
                file: file.to_string(),
                line: site.line + 1,
                function: site.function,
                kind: transform.kind,
                transform: transform.name.clone(),
                original_snippet: original.trim().to_string(),
                injected_snippet: rewritten.trim().to_string(),
            });
        }

        if records.len() < bug_count {
            return Err(InjectionError::InsufficientSites {
                file: file.to_string(),
                requested: bug_count,
                found: records.len(),
            });
        }

        records.sort_by_key(|r| r.line);
        Ok(InjectionOutcome {
            mutated: lines.join("\n"),
            records,
        })
    }
}

/// Yields (line index, enclosing function, line) for injectable lines.
fn function_body_lines(source: &str, language: Language) -> Vec<(usize, String, &str)> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    for (idx, line) in source.split('\n').enumerate() {
        let trimmed = line.trim_start();
        let top_level = !line.is_empty() && trimmed.len() == line.len();
        match language {
            Language::Python => {
                if let Some(name) = trimmed.strip_prefix("def ") {
                    current = name.split('(').next().map(|n| n.trim().to_string());
                    continue;
                }
                if top_level {
                    current = None;
                }
            }
            Language::JavaScript => {
                if top_level {
                    if let Some(name) = trimmed.strip_prefix("function ") {
                        current = name.split('(').next().map(|n| n.trim().to_string());
                        continue;
                    }
                    current = None;
                    continue;
                }
            }
        }
        let Some(function) = current.as_ref() else {
            continue;
        };
        if is_injectable(language, trimmed) {
            out.push((idx, function.clone(), line));
        }
    }
    out
}

fn is_injectable(language: Language, trimmed: &str) -> bool {
    if trimmed.is_empty() {
        return false;
    }
    let excluded: &[&str] = match language {
        Language::Python => &["#", "\"\"\"", "'''", "def ", "class ", "import ", "from ", "@"],
        Language::JavaScript => &["//", "/*", "*", "function ", "module.exports", "require("],
    };
    !excluded.iter().any(|p| trimmed.starts_with(p))
}
