//! Execution limits and paths for the sandbox

use crate::error::SandboxError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration handed to every sandbox component at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executable invoked with the workspace path as its only argument
    pub interpreter_path: PathBuf,

    /// Extension appended to every workspace file
    pub file_extension: String,

    /// Wall-clock deadline for one execution
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Largest accepted source, in bytes
    pub max_source_bytes: usize,

    /// Largest accepted stdout or stderr, in bytes per stream
    pub max_output_bytes: usize,

    /// Root under which per-caller workspace directories are created
    pub workspace_root: PathBuf,

    /// Age after which the reaper deletes a workspace file
    #[serde(with = "humantime_serde")]
    pub retention: Duration,

    /// Time between reaper sweeps
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// How long a timed-out interpreter gets between SIGTERM and SIGKILL
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,

    /// Upper bound on the best-effort history write
    #[serde(with = "humantime_serde")]
    pub history_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter_path: PathBuf::from("./build/lynx"),
            file_extension: ".lynx".to_string(),
            timeout: Duration::from_secs(30),
            max_source_bytes: 1024 * 1024,
            max_output_bytes: 100_000,
            workspace_root: PathBuf::from("./temp"),
            retention: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
            kill_grace: Duration::from_secs(5),
            history_timeout: Duration::from_secs(5),
        }
    }
}

impl SandboxConfig {
    pub fn with_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter_path = path.into();
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_history_timeout(mut self, timeout: Duration) -> Self {
        self.history_timeout = timeout;
        self
    }

    /// Reject values that would make every execution fail or never end
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.interpreter_path.as_os_str().is_empty() {
            return Err(SandboxError::Config(
                "interpreter_path must not be empty".to_string(),
            ));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(SandboxError::Config(
                "workspace_root must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SandboxError::Config("timeout must be positive".to_string()));
        }
        if self.max_source_bytes == 0 || self.max_output_bytes == 0 {
            return Err(SandboxError::Config(
                "size limits must be positive".to_string(),
            ));
        }
        // the reaper judges staleness by mtime alone, so a workspace must
        // outlive the longest execution including its kill grace
        let lifetime = self.timeout.saturating_add(self.kill_grace);
        if self.retention.is_zero() || self.retention <= lifetime {
            return Err(SandboxError::Config(format!(
                "retention ({:?}) must exceed timeout plus kill_grace ({:?})",
                self.retention, lifetime
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(SandboxError::Config(
                "sweep_interval must be positive".to_string(),
            ));
        }
        if self.file_extension.contains(std::path::MAIN_SEPARATOR) {
            return Err(SandboxError::Config(format!(
                "file_extension '{}' must not contain a path separator",
                self.file_extension
            )));
        }
        Ok(())
    }
}
