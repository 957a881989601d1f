//! Simulated terminal history shown to the agent.
//!
//! At reset the history holds an `ls` and an `ls -lh` of the project so the
//! agent starts with the same context a human would get on opening a shell.
//! Each executed command is appended with its (shortened) output.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::CommandResult;

/// Per-entry output limit in the rendered history.
pub const HISTORY_OUTPUT_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliHistory {
    entries: Vec<HistoryEntry>,
}

impl CliHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History for a freshly materialized project.
    pub fn initial(files: &BTreeMap<String, String>) -> Self {
        let mut top_level: BTreeSet<String> = BTreeSet::new();
        for path in files.keys() {
            match path.split_once('/') {
                Some((dir, _)) => top_level.insert(format!("{}/", dir)),
                None => top_level.insert(path.clone()),
            };
        }
        let ls = top_level.into_iter().collect::<Vec<_>>().join("  ");

        let total: usize = files.values().map(String::len).sum();
        let mut long = format!("total {}", human_size(total));
        for (path, content) in files {
            long.push_str(&format!(
                "\n-rw------- 1 agent agent {:>5} {}",
                human_size(content.len()),
                path
            ));
        }

        let mut history = Self::new();
        history.push("ls", ls);
        history.push("ls -lh", long);
        history
    }

    pub fn push(&mut self, command: impl Into<String>, output: impl Into<String>) {
        self.entries.push(HistoryEntry {
            command: command.into(),
            output: shorten(&output.into(), HISTORY_OUTPUT_LIMIT),
        });
    }

    /// Appends an executed (or rejected) command.
    pub fn record(&mut self, result: &CommandResult) {
        let mut output = result.stdout.clone();
        if !result.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&result.stderr);
        }
        if result.exit_code != 0 {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("[exit code: {}]", result.exit_code));
        }
        self.push(result.command.clone(), output);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `$ command` lines followed by their output.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let output = entry.output.trim_end_matches('\n');
                if output.is_empty() {
                    format!("$ {}", entry.command)
                } else {
                    format!("$ {}\n{}", entry.command, output)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn human_size(bytes: usize) -> String {
    if bytes < 1024 {
        bytes.to_string()
    } else if bytes < 1024 * 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn shorten(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n... (output truncated)", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommandRejected, RejectReason};

    fn project() -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert("main.py".to_string(), "x = 1\n".to_string());
        files.insert("test_main.py".to_string(), "y".repeat(2048));
        files.insert("lib/helpers.py".to_string(), String::new());
        files
    }

    #[test]
    fn test_initial_history() {
        let history = CliHistory::initial(&project());
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].output, "lib/  main.py  test_main.py");
        let long = &history.entries()[1].output;
        assert!(long.starts_with("total 2.0K"));
        assert!(long.contains("    6 main.py"));
        assert!(long.contains(" 2.0K test_main.py"));

        let rendered = history.render();
        assert!(rendered.starts_with("$ ls\nlib/  main.py"));
        assert!(rendered.contains("$ ls -lh\ntotal"));
    }

    #[test]
    fn test_record_rejected_command() {
        let mut history = CliHistory::new();
        let err = CommandRejected::new("curl x", RejectReason::NotAllowed, "'curl' is not allowed");
        history.record(&CommandResult::rejected(&err));
        let rendered = history.render();
        assert!(rendered.starts_with("$ curl x\n"));
        assert!(rendered.ends_with("[exit code: -2]"));
    }

    #[test]
    fn test_long_output_is_shortened() {
        let mut history = CliHistory::new();
        history.push("cat big.txt", "é".repeat(HISTORY_OUTPUT_LIMIT));
        let output = &history.entries()[0].output;
        assert!(output.ends_with("... (output truncated)"));
        assert!(output.len() < HISTORY_OUTPUT_LIMIT + 40);
    }
}
