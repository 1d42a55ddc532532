//! Normalized result of one execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected before any resource was allocated
    Validation,
    /// Interpreter could not be spawned
    Startup,
    /// Interpreter ran and exited non-zero or was killed
    Runtime,
    /// Deadline exceeded
    Timeout,
    /// Interpreter wrote more than the configured output ceiling
    OutputLimit,
    /// Workspace file could not be prepared
    Workspace,
    /// Supervisor failed for a reason unrelated to the submitted code
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Startup => "startup",
            FailureKind::Runtime => "runtime",
            FailureKind::Timeout => "timeout",
            FailureKind::OutputLimit => "output_limit",
            FailureKind::Workspace => "workspace",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution as returned to the caller.
///
/// Exactly one of success-with-output or failure-with-error holds. On a
/// runtime failure `output` still carries whatever the interpreter wrote to
/// stdout; on a timeout it is always empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn succeeded(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            failure: None,
            duration_ms,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            failure: Some(kind),
            duration_ms,
        }
    }

    /// Keep the captured stdout alongside a failure
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}
