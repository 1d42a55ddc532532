//! Supervisor trait and implementations

mod deadline;
mod process;

use crate::Result;
use async_trait::async_trait;
use lynx_common::ExecutionOutcome;
use std::path::Path;
use std::time::Duration;

pub use process::ProcessSupervisor;

/// Runs the interpreter against one workspace file.
///
/// Every interpreter-level failure (spawn failure, non-zero exit, timeout)
/// is reported inside the returned outcome. `Err` is reserved for failures
/// of the supervisor itself, which the orchestrator turns into an internal
/// failure outcome.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn run(&self, workspace: &Path, timeout: Duration) -> Result<ExecutionOutcome>;

    /// Get supervisor name
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: Supervisor + ?Sized> Supervisor for std::sync::Arc<S> {
    async fn run(&self, workspace: &Path, timeout: Duration) -> Result<ExecutionOutcome> {
        (**self).run(workspace, timeout).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
