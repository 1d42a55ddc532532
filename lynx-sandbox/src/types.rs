//! Core types for sandbox execution

use lynx_common::{Caller, DocumentId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The source text to execute
    pub source: String,

    /// Who the execution runs for
    pub caller: Caller,

    /// Saved document this run belongs to, if any
    #[serde(default)]
    pub document: Option<DocumentId>,

    /// Optional tighter deadline; never extends the configured timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Create an anonymous execution request
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            caller: Caller::Anonymous,
            document: None,
            timeout: None,
        }
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_document(mut self, document: impl Into<DocumentId>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Set a per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deadline for this request given the configured ceiling
    pub fn effective_timeout(&self, ceiling: Duration) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout.min(ceiling),
            _ => ceiling,
        }
    }
}
