//! Lynx sandbox - execution service for untrusted source
//!
//! Materializes submitted source into a per-caller workspace file, runs the
//! configured interpreter against it under a deadline, always removes the
//! file afterwards and hands the outcome to an optional history sink.

mod config;
mod error;
mod reaper;
mod runtime;
mod service;
mod types;
mod validation;
mod workspace;

pub use config::SandboxConfig;
pub use error::{ExecutionError, SandboxError, StreamName, ValidationError};
pub use reaper::{ReaperHandle, SweepReport, WorkspaceReaper};
pub use runtime::{ProcessSupervisor, Supervisor};
pub use service::ExecutionService;
pub use types::ExecutionRequest;
pub use validation::validate_source;
pub use workspace::{Workspace, WorkspaceManager};

pub use lynx_common::{Caller, CallerId, DocumentId, ExecutionOutcome, FailureKind, HistorySink};

/// Re-export common error types
pub type Result<T> = std::result::Result<T, SandboxError>;
