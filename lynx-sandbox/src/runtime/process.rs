//! Process-based supervisor

use super::deadline::Deadline;
use crate::config::SandboxConfig;
use crate::error::{ExecutionError, SandboxError, StreamName};
use crate::Result;
use async_trait::async_trait;
use lynx_common::ExecutionOutcome;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Runs the configured interpreter as a child process.
///
/// The child gets the workspace path as its only argument, no stdin, and an
/// environment reduced to `PATH`. Output of both streams is collected
/// concurrently while a deadline races the process.
pub struct ProcessSupervisor {
    interpreter: PathBuf,
    working_dir: Option<PathBuf>,
    max_output_bytes: usize,
    kill_grace: Duration,
    armed: Arc<AtomicUsize>,
}

impl ProcessSupervisor {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        let defaults = SandboxConfig::default();
        Self {
            interpreter: interpreter.into(),
            working_dir: None,
            max_output_bytes: defaults.max_output_bytes,
            kill_grace: defaults.kill_grace,
            armed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(resolve_interpreter(&config.interpreter_path))
            .with_max_output_bytes(config.max_output_bytes)
            .with_kill_grace(config.kill_grace)
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Number of deadlines currently armed; zero whenever no run is in flight
    pub fn armed_deadlines(&self) -> usize {
        self.armed.load(Ordering::SeqCst)
    }

    fn command(&self, workspace: &Path) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(workspace)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// SIGTERM now, SIGKILL after the grace period, reaped in the background
    fn terminate(&self, mut child: Child) {
        let pid = child.id();
        send_terminate(&mut child);

        let grace = self.kill_grace;
        tokio::spawn(async move {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(?pid, %status, "Terminated interpreter exited"),
                Ok(Err(e)) => warn!(?pid, error = %e, "Failed to reap terminated interpreter"),
                Err(_) => {
                    warn!(?pid, "Interpreter ignored SIGTERM, killing");
                    if let Err(e) = child.kill().await {
                        warn!(?pid, error = %e, "Failed to kill interpreter");
                    }
                }
            }
        });
    }
}

/// Anchor a relative interpreter path like `./build/lynx` to the current
/// directory, since the child runs from the workspace root. Bare names are
/// left for `PATH` lookup.
fn resolve_interpreter(path: &Path) -> PathBuf {
    if path.is_absolute() || path.components().count() < 2 {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[async_trait]
impl super::Supervisor for ProcessSupervisor {
    async fn run(&self, workspace: &Path, timeout: Duration) -> Result<ExecutionOutcome> {
        let start = Instant::now();

        let mut child = match self.command(workspace).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    interpreter = %self.interpreter.display(),
                    error = %e,
                    "Failed to start interpreter"
                );
                return Ok(ExecutionError::Startup(e.to_string()).into_outcome(elapsed_ms(start)));
            }
        };
        debug!(
            pid = ?child.id(),
            workspace = %workspace.display(),
            timeout_ms = timeout.as_millis() as u64,
            "Interpreter started"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        // Process completion and the deadline race; whichever wins, the
        // deadline is disarmed right after the select.
        let mut deadline = Deadline::arm(timeout, self.armed.clone());
        let collected = tokio::select! {
            biased;
            result = collect(&mut child, stdout, stderr, limit) => Some(result),
            _ = deadline.expired() => None,
        };
        deadline.disarm();
        let duration_ms = elapsed_ms(start);

        match collected {
            None => {
                warn!(
                    workspace = %workspace.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Execution timed out"
                );
                self.terminate(child);
                Ok(ExecutionError::Timeout.into_outcome(duration_ms))
            }
            Some(Err(CollectError::Limit(stream))) => {
                warn!(%stream, limit, "Interpreter output exceeded limit");
                self.terminate(child);
                Ok(ExecutionError::OutputLimit(stream).into_outcome(duration_ms))
            }
            Some(Err(CollectError::Io(e))) => {
                self.terminate(child);
                Err(SandboxError::Io(e))
            }
            Some(Ok(Collected {
                status,
                stdout,
                stderr,
            })) => {
                if status.success() {
                    debug!(duration_ms, bytes = stdout.len(), "Interpreter succeeded");
                    Ok(ExecutionOutcome::succeeded(stdout, duration_ms))
                } else {
                    debug!(duration_ms, %status, "Interpreter failed");
                    let message = compose_failure(&status, &stdout, &stderr);
                    Ok(ExecutionError::Runtime(message)
                        .into_outcome(duration_ms)
                        .with_output(stdout))
                }
            }
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}

struct Collected {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

#[derive(Debug)]
enum CollectError {
    Limit(StreamName),
    Io(std::io::Error),
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Drain both streams to EOF, then reap the child.
///
/// EOF arrives only once every holder of the pipes has closed them, so a
/// script that backgrounds a child with inherited stdout or stderr is not
/// done until that child exits. If it outlives the deadline the run is
/// reported as a timeout even though the interpreter itself exited 0.
async fn collect(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    limit: usize,
) -> std::result::Result<Collected, CollectError> {
    let (stdout, stderr) = tokio::try_join!(
        read_capped(stdout, limit, StreamName::Stdout),
        read_capped(stderr, limit, StreamName::Stderr),
    )?;
    let status = child.wait().await?;
    Ok(Collected {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
    stream: StreamName,
) -> std::result::Result<Vec<u8>, CollectError> {
    let mut buf = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(buf);
    };
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(CollectError::Limit(stream));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: the child has not been reaped yet, so the pid cannot have been reused
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Exit summary, then trimmed stderr, or trimmed stdout when stderr is empty
fn compose_failure(status: &ExitStatus, stdout: &str, stderr: &str) -> String {
    let mut parts = vec![exit_summary(status)];
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    if !stderr.is_empty() {
        parts.push(stderr.to_string());
    } else if !stdout.is_empty() {
        parts.push(stdout.to_string());
    }
    parts.join("\n")
}

fn exit_summary(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Compiler exited with code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!(
                "Compiler terminated by signal {} ({})",
                signal,
                signal_name(signal)
            );
        }
    }
    "Compiler exited abnormally".to_string()
}

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGXCPU => "SIGXCPU",
        libc::SIGXFSZ => "SIGXFSZ",
        _ => "unknown",
    }
}
