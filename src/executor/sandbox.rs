//! Per-episode sandbox.
//!
//! A sandbox is a private temporary directory holding a copy of the
//! scenario's files. Commands run directly from their argv (never through a
//! shell) with the sandbox as working directory, a scrubbed environment and
//! bounded time and output.
//!
//! `run` takes `&mut self` and `destroy` consumes the handle, so a command
//! can never race with teardown.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::SandboxError;
use crate::scenario::render_file_tree;

use super::parser::{check_path, CommandFilter, ParsedCommand};
use super::process::{run_process, ProcessSpec, ResourceLimits, DEFAULT_OUTPUT_CAP};
use super::CommandResult;

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Directories hidden from file trees and file snapshots.
const IGNORED_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", ".pytest_cache"];

// ============================================================================
// Configuration
// ============================================================================

/// Execution limits for commands run inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub timeout: Duration,
    pub output_cap: usize,
    pub limits: ResourceLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            output_cap: DEFAULT_OUTPUT_CAP,
            limits: ResourceLimits::default(),
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_cap(mut self, cap: usize) -> Self {
        self.output_cap = cap;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Environment handed to every process started in a sandbox rooted at `root`.
pub fn sandbox_env(root: &Path, cwd: &Path) -> Vec<(String, String)> {
    let path = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
    let root = root.display().to_string();
    vec![
        ("PATH".to_string(), path),
        ("HOME".to_string(), root.clone()),
        ("TMPDIR".to_string(), root),
        ("PWD".to_string(), cwd.display().to_string()),
        ("LANG".to_string(), "C.UTF-8".to_string()),
        ("LC_ALL".to_string(), "C.UTF-8".to_string()),
        ("NO_COLOR".to_string(), "1".to_string()),
        ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
        ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()),
        ("GIT_AUTHOR_NAME".to_string(), "agent".to_string()),
        ("GIT_AUTHOR_EMAIL".to_string(), "agent@sandbox.local".to_string()),
        ("GIT_COMMITTER_NAME".to_string(), "agent".to_string()),
        ("GIT_COMMITTER_EMAIL".to_string(), "agent@sandbox.local".to_string()),
    ]
}

// ============================================================================
// Sandbox
// ============================================================================

/// Isolated working copy of a scenario.
#[derive(Debug)]
pub struct Sandbox {
    id: Uuid,
    dir: Option<TempDir>,
    root: PathBuf,
    cwd: PathBuf,
    config: SandboxConfig,
}

impl Sandbox {
    /// Materializes `files` (relative path to content) into a fresh directory.
    pub fn create(files: &BTreeMap<String, String>, config: SandboxConfig) -> Result<Self, SandboxError> {
        for path in files.keys() {
            validate_file_path(path)?;
        }

        let dir = tempfile::Builder::new()
            .prefix("cli_rl_env_")
            .tempdir()
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;
        set_mode(dir.path(), 0o700)?;
        let root = dir
            .path()
            .canonicalize()
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        for (path, content) in files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
                set_mode(parent, 0o700)?;
            }
            fs::write(&target, content)?;
            set_mode(&target, 0o600)?;
        }

        let id = Uuid::new_v4();
        info!(sandbox = %id, root = %root.display(), files = files.len(), "Sandbox created");
        Ok(Self {
            id,
            dir: Some(dir),
            cwd: root.clone(),
            root,
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn ensure_root(&self) -> Result<(), SandboxError> {
        if self.dir.is_none() || !self.root.is_dir() {
            return Err(SandboxError::RootMissing(self.root.display().to_string()));
        }
        Ok(())
    }

    /// Runs one validated command.
    ///
    /// Command failures (non-zero exit, timeout, missing program) are part of
    /// the returned result; only infrastructure failures are errors.
    pub async fn run(&mut self, command: &ParsedCommand) -> Result<CommandResult, SandboxError> {
        self.ensure_root()?;
        let started_at = Utc::now();

        match command.program() {
            "pwd" => {
                return Ok(CommandResult::builtin(
                    command.raw(),
                    format!("{}\n", self.cwd.display()),
                    String::new(),
                    0,
                    started_at,
                ))
            }
            "cd" => return Ok(self.change_dir(command, started_at)),
            _ => {}
        }

        let mut args = Vec::with_capacity(command.args().len());
        for arg in command.args() {
            if arg.glob {
                args.extend(expand_glob(&self.cwd, &arg.value));
            } else {
                args.push(arg.value.clone());
            }
        }

        let stdout_file = match command.redirect() {
            Some(redirect) => match self.open_redirect(&redirect.target, redirect.append) {
                Ok(file) => Some(file),
                Err(message) => {
                    return Ok(CommandResult::builtin(
                        command.raw(),
                        String::new(),
                        message,
                        1,
                        started_at,
                    ))
                }
            },
            None => None,
        };

        let spec = ProcessSpec {
            program: command.program(),
            args,
            cwd: &self.cwd,
            env: sandbox_env(&self.root, &self.cwd),
            stdin: command.heredoc().map(|body| body.as_bytes().to_vec()),
            stdout_file,
            timeout: self.config.timeout,
            output_cap: self.config.output_cap,
            limits: self.config.limits,
        };
        let output = run_process(spec).await.map_err(|e| {
            if self.root.is_dir() {
                SandboxError::Io(e)
            } else {
                SandboxError::RootMissing(self.root.display().to_string())
            }
        })?;

        if output.timed_out {
            warn!(sandbox = %self.id, command = %command.raw(), "Command timed out");
        }
        debug!(
            sandbox = %self.id,
            command = %command.raw(),
            exit_code = output.exit_code,
            "Command finished"
        );
        Ok(CommandResult::from_output(command.raw(), output, started_at))
    }

    /// Validates and runs each command in order. Rejections are recorded and
    /// do not stop the batch.
    pub async fn execute_batch(
        &mut self,
        commands: &[String],
        filter: &CommandFilter,
    ) -> Result<Vec<CommandResult>, SandboxError> {
        let mut results = Vec::with_capacity(commands.len());
        for raw in commands {
            match filter.validate(raw) {
                Ok(parsed) => results.push(self.run(&parsed).await?),
                Err(rejected) => {
                    debug!(sandbox = %self.id, command = %raw, reason = %rejected.reason, "Command rejected");
                    results.push(CommandResult::rejected(&rejected));
                }
            }
        }
        Ok(results)
    }

    fn change_dir(&mut self, command: &ParsedCommand, started_at: chrono::DateTime<Utc>) -> CommandResult {
        let target = match command.args().first() {
            None => self.root.clone(),
            Some(arg) => self.cwd.join(&arg.value),
        };
        let fail = |msg: String| CommandResult::builtin(command.raw(), String::new(), msg, 1, started_at);

        let resolved = match target.canonicalize() {
            Ok(path) => path,
            Err(_) => {
                return fail(format!(
                    "cd: {}: No such file or directory\n",
                    command.arg_values().first().copied().unwrap_or_default()
                ))
            }
        };
        if !resolved.is_dir() {
            return fail(format!(
                "cd: {}: Not a directory\n",
                command.arg_values().first().copied().unwrap_or_default()
            ));
        }
        // Anything above the root lands on the root.
        self.cwd = if resolved.starts_with(&self.root) {
            resolved
        } else {
            self.root.clone()
        };
        CommandResult::builtin(command.raw(), String::new(), String::new(), 0, started_at)
    }

    fn open_redirect(&self, target: &str, append: bool) -> Result<fs::File, String> {
        let path = self.cwd.join(target);
        let parent = path
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .ok_or_else(|| format!("{}: No such file or directory\n", target))?;
        if !parent.starts_with(&self.root) {
            return Err(format!("{}: redirect target outside the sandbox\n", target));
        }
        if let Ok(existing) = path.canonicalize() {
            if !existing.starts_with(&self.root) {
                return Err(format!("{}: redirect target outside the sandbox\n", target));
            }
        }

        let mut options = fs::OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(&path).map_err(|e| format!("{}: {}\n", target, e))
    }

    /// Current contents of every regular file, keyed by relative path.
    pub fn read_files(&self) -> Result<BTreeMap<String, String>, SandboxError> {
        self.ensure_root()?;
        let mut files = BTreeMap::new();
        for (relative, path) in self.walk_files() {
            match fs::read(&path) {
                Ok(bytes) => {
                    files.insert(relative, String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(e) => debug!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
        Ok(files)
    }

    /// `Files:` listing of the live working copy.
    pub fn file_tree(&self) -> String {
        let entries: Vec<(String, usize)> = self
            .walk_files()
            .into_iter()
            .map(|(relative, path)| {
                let size = fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
                (relative, size)
            })
            .collect();
        render_file_tree(entries.iter().map(|(p, s)| (p.as_str(), *s)))
    }

    fn walk_files(&self) -> Vec<(String, PathBuf)> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map_or(false, |name| IGNORED_DIRS.contains(&name))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let relative = e.path().strip_prefix(&self.root).ok()?.to_string_lossy().into_owned();
                Some((relative, e.path().to_path_buf()))
            })
            .collect()
    }

    /// Removes the sandbox directory.
    pub fn destroy(mut self) -> Result<(), SandboxError> {
        self.cleanup()
    }

    fn cleanup(&mut self) -> Result<(), SandboxError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            debug!(sandbox = %self.id, "Plain removal failed ({}), restoring permissions", e);
            if path.exists() {
                restore_permissions(&path);
                fs::remove_dir_all(&path).map_err(|e| SandboxError::CleanupFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        info!(sandbox = %self.id, "Sandbox destroyed");
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!(sandbox = %self.id, "Sandbox dropped without destroy, cleaning up");
            if let Err(e) = self.cleanup() {
                warn!(sandbox = %self.id, "Cleanup on drop failed: {}", e);
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_file_path(path: &str) -> Result<(), SandboxError> {
    if path.is_empty() || check_path(path, false).is_err() {
        return Err(SandboxError::PathEscape(path.to_string()));
    }
    let normal_only = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !normal_only {
        return Err(SandboxError::PathEscape(path.to_string()));
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), SandboxError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), SandboxError> {
    Ok(())
}

/// Makes everything under `path` owner-accessible again so it can be removed.
fn restore_permissions(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mode = if meta.is_dir() { 0o700 } else { 0o600 };
    let _ = set_mode(path, mode);
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                restore_permissions(&entry.path());
            }
        }
    }
}

fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Translates one shell glob path segment into an anchored regex.
fn segment_regex(segment: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let chars: Vec<char> = segment.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..].iter().position(|&c| c == ']').map(|p| p + i + 1);
                match close {
                    Some(end) if end > i + 1 => {
                        let mut class: String = chars[i + 1..end].iter().collect();
                        if let Some(rest) = class.strip_prefix('!') {
                            class = format!("^{}", rest);
                        }
                        pattern.push('[');
                        pattern.push_str(&class.replace('\\', "\\\\"));
                        pattern.push(']');
                        i = end;
                    }
                    _ => pattern.push_str(&regex::escape("[")),
                }
            }
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Expands a glob relative to `cwd`, sorted. No match leaves the pattern as
/// typed, like an interactive shell does.
fn expand_glob(cwd: &Path, pattern: &str) -> Vec<String> {
    let join = |prefix: &str, name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    };

    let mut matches = vec![String::new()];
    for segment in pattern.split('/') {
        let mut next = Vec::new();
        for prefix in &matches {
            if !has_glob_chars(segment) {
                next.push(join(prefix, segment));
                continue;
            }
            let Some(re) = segment_regex(segment) else {
                continue;
            };
            let dir = if prefix.is_empty() {
                cwd.to_path_buf()
            } else {
                cwd.join(prefix)
            };
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| (!name.starts_with('.') || segment.starts_with('.')) && re.is_match(name))
                .collect();
            names.sort();
            next.extend(names.iter().map(|name| join(prefix, name)));
        }
        matches = next;
    }

    matches.retain(|m| cwd.join(m).exists());
    if matches.is_empty() {
        vec![pattern.to_string()]
    } else {
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{REJECTED_EXIT_CODE, TIMEOUT_EXIT_CODE};

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    fn sandbox(pairs: &[(&str, &str)]) -> Sandbox {
        Sandbox::create(&files(pairs), SandboxConfig::default()).unwrap()
    }

    async fn run(sb: &mut Sandbox, command: &str) -> CommandResult {
        let parsed = CommandFilter::new().validate(command).unwrap();
        sb.run(&parsed).await.unwrap()
    }

    // --- creation ---

    #[test]
    fn test_create_materializes_files() {
        let sb = sandbox(&[("main.py", "x = 1\n"), ("pkg/util.py", "y = 2\n")]);
        assert_eq!(fs::read_to_string(sb.root().join("main.py")).unwrap(), "x = 1\n");
        assert!(sb.root().join("pkg/util.py").is_file());
        assert!(sb
            .root()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cli_rl_env_"));
        assert_eq!(sb.cwd(), sb.root());
        sb.destroy().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_create_sets_private_modes() {
        use std::os::unix::fs::PermissionsExt;
        let sb = sandbox(&[("main.py", "x = 1\n")]);
        let dir_mode = fs::metadata(sb.root()).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(sb.root().join("main.py")).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
        sb.destroy().unwrap();
    }

    #[test]
    fn test_create_rejects_escaping_paths() {
        for bad in ["../evil.py", "/etc/passwd", "a/../../b", ""] {
            let result = Sandbox::create(&files(&[(bad, "x")]), SandboxConfig::default());
            assert!(matches!(result, Err(SandboxError::PathEscape(_))), "{:?}", bad);
        }
    }

    // --- builtins ---

    #[tokio::test]
    async fn test_cd_and_pwd() {
        let mut sb = sandbox(&[("src/app.py", "pass\n")]);
        let root = sb.root().to_path_buf();

        let result = run(&mut sb, "cd src").await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(sb.cwd(), root.join("src"));

        let pwd = run(&mut sb, "pwd").await;
        assert_eq!(pwd.stdout.trim_end(), root.join("src").display().to_string());

        run(&mut sb, "cd ..").await;
        assert_eq!(sb.cwd(), root);

        // Clamped at the root.
        let result = run(&mut sb, "cd ..").await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(sb.cwd(), root);
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_cd_missing_directory() {
        let mut sb = sandbox(&[("main.py", "")]);
        let result = run(&mut sb, "cd nope").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("No such file"));
        sb.destroy().unwrap();
    }

    // --- spawning ---

    #[tokio::test]
    async fn test_cat_reads_file() {
        let mut sb = sandbox(&[("main.py", "print('hi')\n")]);
        let result = run(&mut sb, "cat main.py").await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "print('hi')\n");
        assert!(!result.truncated);
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_passes_native_exit_code() {
        let mut sb = sandbox(&[("main.py", "")]);
        let result = run(&mut sb, "cat missing.py").await;
        assert_ne!(result.exit_code, 0);
        assert!(!result.stderr.is_empty());
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_redirect_writes_inside_sandbox() {
        let mut sb = sandbox(&[("main.py", "")]);
        let result = run(&mut sb, "echo hello > out.txt").await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "");
        run(&mut sb, "echo again >> out.txt").await;
        assert_eq!(
            fs::read_to_string(sb.root().join("out.txt")).unwrap(),
            "hello\nagain\n"
        );
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_heredoc_feeds_stdin() {
        let mut sb = sandbox(&[("main.py", "")]);
        let result = run(&mut sb, "cat > notes.txt <<EOF\nline one\nline two\nEOF").await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(
            fs::read_to_string(sb.root().join("notes.txt")).unwrap(),
            "line one\nline two\n"
        );
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_glob_expansion() {
        let mut sb = sandbox(&[("a.py", "1\n"), ("b.py", "2\n"), ("c.js", "3\n")]);
        let result = run(&mut sb, "cat *.py").await;
        assert_eq!(result.stdout, "1\n2\n");
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_timeout_reports_sentinel() {
        let mut sb = Sandbox::create(
            &files(&[("main.py", "")]),
            SandboxConfig::default().with_timeout(Duration::from_millis(300)),
        )
        .unwrap();
        let result = sb.run(&ParsedCommand::trusted("sleep", ["5"])).await.unwrap();
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.timed_out);
        assert_eq!(result.stderr, "timeout");
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_batch_continues_after_rejection() {
        let mut sb = sandbox(&[("main.py", "x\n")]);
        let commands = vec![
            "cat /etc/passwd".to_string(),
            "cat main.py".to_string(),
        ];
        let results = sb.execute_batch(&commands, &CommandFilter::new()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].exit_code, REJECTED_EXIT_CODE);
        assert_eq!(results[1].stdout, "x\n");
        sb.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_run_after_root_removed_is_error() {
        let mut sb = sandbox(&[("main.py", "")]);
        fs::remove_dir_all(sb.root()).unwrap();
        let parsed = CommandFilter::new().validate("ls").unwrap();
        let result = sb.run(&parsed).await;
        assert!(matches!(result, Err(SandboxError::RootMissing(_))));
        sb.destroy().unwrap();
    }

    // --- snapshots ---

    #[tokio::test]
    async fn test_file_tree_and_read_files() {
        let mut sb = sandbox(&[("main.py", "abc\n"), ("test_main.py", "t\n")]);
        assert_eq!(
            sb.file_tree(),
            "Files:\n  - main.py (4 bytes)\n  - test_main.py (2 bytes)"
        );
        run(&mut sb, "touch extra.txt").await;
        let snapshot = sb.read_files().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["main.py"], "abc\n");
        sb.destroy().unwrap();
    }

    // --- teardown ---

    #[test]
    fn test_destroy_removes_root() {
        let sb = sandbox(&[("main.py", "")]);
        let root = sb.root().to_path_buf();
        sb.destroy().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_drop_removes_root() {
        let root = {
            let sb = sandbox(&[("main.py", "")]);
            sb.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destroy_after_chmod_lockout() {
        let mut sb = sandbox(&[("locked/inner.py", "x\n")]);
        let root = sb.root().to_path_buf();
        let result = run(&mut sb, "chmod 000 locked").await;
        assert_eq!(result.exit_code, 0);
        sb.destroy().unwrap();
        assert!(!root.exists());
    }

    // --- globbing ---

    #[test]
    fn test_expand_glob_no_match_keeps_pattern() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(expand_glob(dir.path(), "*.rs"), vec!["*.rs".to_string()]);
    }

    #[test]
    fn test_expand_glob_nested_and_classes() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a1.py"), "").unwrap();
        fs::write(dir.path().join("src/b2.py"), "").unwrap();
        fs::write(dir.path().join(".hidden.py"), "").unwrap();
        assert_eq!(expand_glob(dir.path(), "src/*.py"), vec!["src/a1.py", "src/b2.py"]);
        assert_eq!(expand_glob(dir.path(), "src/[a]?.py"), vec!["src/a1.py"]);
        assert_eq!(expand_glob(dir.path(), "*.py"), vec!["*.py"]);
    }
}
