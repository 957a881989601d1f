//! Bounded subprocess execution.
//!
//! Every child runs in its own process group with `kill_on_drop`, a cleared
//! environment and best-effort rlimits. stdout/stderr are drained
//! concurrently and capped; a timeout kills the whole group and reaps the
//! child before returning.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported when a command hits its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Exit code reported for commands refused by the whitelist filter.
pub const REJECTED_EXIT_CODE: i32 = -2;

/// Exit code for programs that could not be found.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit code for programs that could not be executed.
pub const NOT_EXECUTABLE_EXIT_CODE: i32 = 126;

/// Default per-stream capture limit in bytes.
pub const DEFAULT_OUTPUT_CAP: usize = 100_000;

const READ_CHUNK: usize = 8192;

/// Per-process resource limits applied in the child before exec (unix only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU seconds; `None` derives it from the timeout.
    pub cpu_seconds: Option<u64>,
    /// Virtual memory cap. Skipped for JavaScript runtimes, which reserve
    /// large address ranges up front.
    pub address_space_bytes: Option<u64>,
    pub file_size_bytes: Option<u64>,
    pub open_files: Option<u64>,
    pub processes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: None,
            address_space_bytes: Some(512 * 1024 * 1024),
            file_size_bytes: Some(100 * 1024 * 1024),
            open_files: Some(256),
            processes: None,
        }
    }
}

impl ResourceLimits {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            cpu_seconds: None,
            address_space_bytes: None,
            file_size_bytes: None,
            open_files: None,
            processes: None,
        }
    }

    /// Limits adjusted for `program` and `timeout`.
    pub fn for_program(&self, program: &str, timeout: Duration) -> Self {
        let mut limits = *self;
        if matches!(program, "node" | "npm") {
            limits.address_space_bytes = None;
        }
        if limits.cpu_seconds.is_none() {
            limits.cpu_seconds = Some(timeout.as_secs().saturating_add(1));
        }
        limits
    }
}

/// Everything needed to spawn one child.
#[derive(Debug)]
pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin; stdin is `/dev/null` otherwise.
    pub stdin: Option<Vec<u8>>,
    /// Redirect target for stdout; stdout is captured otherwise.
    pub stdout_file: Option<std::fs::File>,
    pub timeout: Duration,
    pub output_cap: usize,
    pub limits: ResourceLimits,
}

impl<'a> ProcessSpec<'a> {
    pub fn new(program: &'a str, cwd: &'a Path) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd,
            env: Vec::new(),
            stdin: None,
            stdout_file: None,
            timeout: Duration::from_secs(30),
            output_cap: DEFAULT_OUTPUT_CAP,
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
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

/// Captured result of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    fn synthetic(exit_code: i32, stderr: String, duration: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            exit_code,
            timed_out: false,
            truncated: false,
            duration,
        }
    }
}

/// Spawns `spec` and waits for it, honoring the timeout.
///
/// Returns `Err` only for spawn failures other than a missing or
/// non-executable program; those are reported as exit codes 127 and 126.
pub async fn run_process(spec: ProcessSpec<'_>) -> std::io::Result<ProcessOutput> {
    let mut cmd = Command::new(spec.program);
    cmd.args(&spec.args)
        .current_dir(spec.cwd)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    match spec.stdout_file {
        Some(file) => cmd.stdout(Stdio::from(file)),
        None => cmd.stdout(Stdio::piped()),
    };

    #[cfg(unix)]
    {
        cmd.process_group(0);
        apply_limits(&mut cmd, spec.limits.for_program(spec.program, spec.timeout));
    }

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ProcessOutput::synthetic(
                NOT_FOUND_EXIT_CODE,
                format!("{}: command not found", spec.program),
                start.elapsed(),
            ));
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Ok(ProcessOutput::synthetic(
                NOT_EXECUTABLE_EXIT_CODE,
                format!("{}: permission denied", spec.program),
                start.elapsed(),
            ));
        }
        Err(e) => return Err(e),
    };

    let stdin_pipe = child.stdin.take();
    let stdin_body = spec.stdin;
    let feed = async move {
        if let (Some(mut pipe), Some(body)) = (stdin_pipe, stdin_body) {
            // A child that exits without reading closes the pipe; that is fine.
            let _ = pipe.write_all(&body).await;
            let _ = pipe.shutdown().await;
        }
    };
    let cap = spec.output_cap;
    let stdout_fut = read_capped(child.stdout.take(), cap);
    let stderr_fut = read_capped(child.stderr.take(), cap);

    let waited = tokio::time::timeout(spec.timeout, async {
        let (_, stdout, stderr, status) = tokio::join!(feed, stdout_fut, stderr_fut, child.wait());
        (stdout, stderr, status)
    })
    .await;

    match waited {
        Ok((stdout, stderr, status)) => {
            let status = status?;
            let (stdout, out_truncated) = stdout;
            let (stderr, err_truncated) = stderr;
            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: exit_code(&status),
                timed_out: false,
                truncated: out_truncated || err_truncated,
                duration: start.elapsed(),
            })
        }
        Err(_) => {
            warn!("{} timed out after {:?}, killing process group", spec.program, spec.timeout);
            kill_process_group(child.id());
            if let Err(e) = child.kill().await {
                debug!("kill after timeout: {}", e);
            }
            let _ = child.wait().await;
            Ok(ProcessOutput::synthetic(
                TIMEOUT_EXIT_CODE,
                "timeout".to_string(),
                start.elapsed(),
            ))
            .map(|mut out| {
                out.timed_out = true;
                out
            })
        }
    }
}

/// Reads a stream to EOF, keeping at most `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool) {
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
                if n > room {
                    truncated = true;
                }
            }
            Err(e) => {
                debug!("output stream read error: {}", e);
                break;
            }
        }
    }
    (buf, truncated)
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; the group was created for this child.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn apply_limits(cmd: &mut Command, limits: ResourceLimits) {
    macro_rules! set_rlimit {
        ($resource:expr, $value:expr) => {
            if let Some(value) = $value {
                let limit = libc::rlimit {
                    rlim_cur: value as libc::rlim_t,
                    rlim_max: value as libc::rlim_t,
                };
                libc::setrlimit($resource, &limit);
            }
        };
    }

    // SAFETY: the hook runs between fork and exec and only calls setrlimit,
    // which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            set_rlimit!(libc::RLIMIT_CPU, limits.cpu_seconds);
            set_rlimit!(libc::RLIMIT_AS, limits.address_space_bytes);
            set_rlimit!(libc::RLIMIT_FSIZE, limits.file_size_bytes);
            set_rlimit!(libc::RLIMIT_NOFILE, limits.open_files);
            set_rlimit!(libc::RLIMIT_NPROC, limits.processes);
            Ok(())
        });
    }
}
