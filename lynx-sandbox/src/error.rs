use lynx_common::{ExecutionOutcome, FailureKind};
use std::fmt;
use thiserror::Error;

/// Internal failures of sandbox machinery
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Source rejected before any workspace or process is touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Code cannot be empty")]
    Empty,

    #[error("Code is too large")]
    TooLarge { size: usize, max: usize },

    #[error("Code contains null bytes")]
    NullByte,

    #[error("Code contains invalid control characters")]
    ControlCharacter,
}

/// Output stream of the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    fn limit_message(&self) -> &'static str {
        match self {
            StreamName::Stdout => "Output too large",
            StreamName::Stderr => "Error output too large",
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamName::Stdout => f.write_str("stdout"),
            StreamName::Stderr => f.write_str("stderr"),
        }
    }
}

/// User-visible execution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to start compiler: {0}")]
    Startup(String),

    /// Composed diagnostic: exit summary, then stderr or stdout
    #[error("{0}")]
    Runtime(String),

    #[error("Execution timed out")]
    Timeout,

    #[error("{}", .0.limit_message())]
    OutputLimit(StreamName),

    #[error("Failed to prepare workspace: {0}")]
    Workspace(String),

    #[error("Internal execution error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::Validation(_) => FailureKind::Validation,
            ExecutionError::Startup(_) => FailureKind::Startup,
            ExecutionError::Runtime(_) => FailureKind::Runtime,
            ExecutionError::Timeout => FailureKind::Timeout,
            ExecutionError::OutputLimit(_) => FailureKind::OutputLimit,
            ExecutionError::Workspace(_) => FailureKind::Workspace,
            ExecutionError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn into_outcome(self, duration_ms: u64) -> ExecutionOutcome {
        ExecutionOutcome::failed(self.kind(), self.to_string(), duration_ms)
    }
}
