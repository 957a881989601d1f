//! Syntax checks applied to source files after each bug injection.
//!
//! Injected bugs must stay parseable so that verification failures are
//! semantic. [`StructuralCheck`] is a dependency-free approximation;
//! [`InterpreterCheck`] asks the real interpreter when one is installed.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::difficulty::Language;

/// Decides whether a source file is syntactically valid.
pub trait SyntaxCheck: Send + Sync {
    /// Returns `Err` with a short description when `source` does not parse.
    fn check(&self, language: Language, source: &str) -> Result<(), String>;
}

/// Bracket, quote and block-header checks that need no interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralCheck;

impl SyntaxCheck for StructuralCheck {
    fn check(&self, language: Language, source: &str) -> Result<(), String> {
        check_brackets(language, source)?;
        if language == Language::Python {
            check_python_indentation(source)?;
        }
        for (idx, line) in source.lines().enumerate() {
            let code = strip_line_comment(language, line);
            let trimmed = code.trim();
            if ends_with_operator(trimmed) {
                return Err(format!("line {}: dangling operator", idx + 1));
            }
            if has_doubled_operator(trimmed) {
                return Err(format!("line {}: doubled operator", idx + 1));
            }
            if language == Language::Python && is_python_block_header(trimmed) && !trimmed.ends_with(':') {
                return Err(format!("line {}: block header without ':'", idx + 1));
            }
        }
        Ok(())
    }
}

/// [`StructuralCheck`] followed by a real parse with `python3`/`node`.
/// The parse is skipped when the interpreter is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterCheck;

impl SyntaxCheck for InterpreterCheck {
    fn check(&self, language: Language, source: &str) -> Result<(), String> {
        StructuralCheck.check(language, source)?;
        let outcome = match language {
            Language::Python => run_python_parse(source),
            Language::JavaScript => run_node_check(source),
        };
        match outcome {
            Ok(result) => result,
            Err(e) => {
                debug!("Interpreter syntax check unavailable ({}), structural check only", e);
                Ok(())
            }
        }
    }
}

fn run_python_parse(source: &str) -> std::io::Result<Result<(), String>> {
    let mut child = Command::new("python3")
        .args(["-c", "import ast, sys; ast.parse(sys.stdin.read())"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(source.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(Ok(()))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Err(last_line(&stderr)))
    }
}

fn run_node_check(source: &str) -> std::io::Result<Result<(), String>> {
    let mut file = tempfile::Builder::new()
        .prefix("cli_rl_env_check_")
        .suffix(".js")
        .tempfile()?;
    file.write_all(source.as_bytes())?;
    let output = Command::new("node")
        .arg("--check")
        .arg(file.path())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;
    if output.status.success() {
        Ok(Ok(()))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Err(last_line(&stderr)))
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("syntax error")
        .trim()
        .to_string()
}

fn check_brackets(language: Language, source: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let code = strip_strings(language, line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
        for ch in code.chars() {
            match ch {
                '(' | '[' | '{' => stack.push((ch, idx + 1)),
                ')' | ']' | '}' => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err(format!("line {}: unbalanced '{}'", idx + 1, ch)),
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((open, line)) => Err(format!("line {}: unclosed '{}'", line, open)),
        None => Ok(()),
    }
}

/// Python block structure: an indent only after a line ending in `:`, and
/// every dedent lands on an enclosing level. Bracket continuation lines are
/// exempt.
fn check_python_indentation(source: &str) -> Result<(), String> {
    let mut levels = vec![0usize];
    let mut expect_indent = false;
    let mut depth: i64 = 0;
    for (idx, line) in source.lines().enumerate() {
        let code = strip_line_comment(Language::Python, line);
        if code.trim().is_empty() {
            continue;
        }
        if depth == 0 {
            let indent = line.len() - line.trim_start().len();
            let current = levels.last().copied().unwrap_or(0);
            if expect_indent {
                if indent <= current {
                    return Err(format!("line {}: expected an indented block", idx + 1));
                }
                levels.push(indent);
            } else if indent > current {
                return Err(format!("line {}: unexpected indent", idx + 1));
            } else {
                while levels.last().is_some_and(|&level| indent < level) {
                    levels.pop();
                }
                if levels.last() != Some(&indent) {
                    return Err(format!("line {}: unindent does not match any outer level", idx + 1));
                }
            }
        }
        for ch in code.chars() {
            match ch {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        expect_indent = depth == 0 && code.trim_end().ends_with(':');
    }
    if expect_indent {
        return Err("expected an indented block at end of file".to_string());
    }
    Ok(())
}

/// Blanks out string literals and trailing comments on one line.
///
/// Python triple-quoted strings are only supported when they open and close
/// on the same line, which holds for every docstring the templates carry.
fn strip_strings(language: Language, line: &str) -> Result<String, String> {
    let mut out = String::with_capacity(line.len());
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if language == Language::Python && ch == '#' {
            break;
        }
        if language == Language::JavaScript && ch == '/' && chars.get(i + 1) == Some(&'/') {
            break;
        }
        if ch == '"' || ch == '\'' || (ch == '`' && language == Language::JavaScript) {
            let triple = language == Language::Python
                && chars.get(i + 1) == Some(&ch)
                && chars.get(i + 2) == Some(&ch);
            let width = if triple { 3 } else { 1 };
            i += width;
            let mut closed = false;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == ch
                    && (!triple
                        || (chars.get(i + 1) == Some(&ch) && chars.get(i + 2) == Some(&ch)))
                {
                    i += width;
                    closed = true;
                    break;
                }
                i += 1;
            }
            if !closed {
                return Err("unterminated string".to_string());
            }
            out.push('_');
            continue;
        }
        out.push(ch);
        i += 1;
    }
    Ok(out)
}

fn strip_line_comment(language: Language, line: &str) -> String {
    strip_strings(language, line).unwrap_or_else(|_| line.to_string())
}

fn ends_with_operator(code: &str) -> bool {
    [" +", " -", " *", " /", " ==", " !=", " <", " >", " and", " or", " &&", " ||"]
        .iter()
        .any(|op| code.ends_with(op))
}

fn has_doubled_operator(code: &str) -> bool {
    ["+ +", "- -", "* +", "+ *", "== ==", "< <", "> >"]
        .iter()
        .any(|op| code.contains(op))
}

fn is_python_block_header(code: &str) -> bool {
    ["def", "class", "if", "elif", "for", "while", "with", "try", "except", "else", "finally"]
        .iter()
        .any(|kw| {
            code.starts_with(kw)
                && code[kw.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric() && c != '_')
        })
        && !code.contains(" if ") // conditional expressions, comprehensions
}
