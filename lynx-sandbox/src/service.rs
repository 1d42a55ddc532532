//! Execution service - main entry point

use crate::config::SandboxConfig;
use crate::error::ExecutionError;
use crate::reaper::{ReaperHandle, WorkspaceReaper};
use crate::runtime::{ProcessSupervisor, Supervisor};
use crate::types::ExecutionRequest;
use crate::validation::validate_source;
use crate::workspace::WorkspaceManager;
use crate::Result;
use lynx_common::{ExecutionOutcome, HistorySink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Validates, runs and records executions.
///
/// Each call acquires one workspace, runs the supervisor once against it,
/// always releases the workspace and then records the outcome. There is no
/// lock across calls; concurrent executions share nothing but the workspace
/// root.
pub struct ExecutionService {
    config: Arc<SandboxConfig>,
    workspaces: Arc<WorkspaceManager>,
    supervisor: Arc<dyn Supervisor>,
    history: Option<Arc<dyn HistorySink>>,
}

impl ExecutionService {
    /// Create a service with a custom supervisor
    pub fn new(config: SandboxConfig, supervisor: impl Supervisor + 'static) -> Result<Self> {
        config.validate()?;
        let workspaces = WorkspaceManager::new(&config.workspace_root, &config.file_extension)?;
        Ok(Self {
            config: Arc::new(config),
            workspaces: Arc::new(workspaces),
            supervisor: Arc::new(supervisor),
            history: None,
        })
    }

    /// Create a service running the configured interpreter as a child process
    pub fn with_process_supervisor(config: SandboxConfig) -> Result<Self> {
        config.validate()?;
        let workspaces = WorkspaceManager::new(&config.workspace_root, &config.file_extension)?;
        let supervisor =
            ProcessSupervisor::from_config(&config).with_working_dir(workspaces.root());
        Ok(Self {
            config: Arc::new(config),
            workspaces: Arc::new(workspaces),
            supervisor: Arc::new(supervisor),
            history: None,
        })
    }

    /// Attach the sink that receives one record per authenticated execution
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Get the supervisor name
    pub fn supervisor_name(&self) -> &str {
        self.supervisor.name()
    }

    /// Reaper over this service's workspace root
    pub fn reaper(&self) -> WorkspaceReaper {
        WorkspaceReaper::new(
            self.workspaces.root(),
            self.config.retention,
            self.config.sweep_interval,
        )
    }

    /// Start the background reaper; it sweeps once immediately
    pub fn spawn_reaper(&self) -> ReaperHandle {
        self.reaper().spawn()
    }

    /// Execute one request and return its outcome.
    ///
    /// Never fails: every problem is reported inside the outcome. Returns
    /// within the effective timeout plus I/O overhead plus at most
    /// `history_timeout`.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let start = Instant::now();

        if let Err(e) = validate_source(&request.source, self.config.max_source_bytes) {
            debug!(caller = %request.caller, error = %e, "Rejected execution request");
            return ExecutionError::from(e).into_outcome(elapsed_ms(start));
        }

        let timeout = request.effective_timeout(self.config.timeout);
        info!(
            caller = %request.caller,
            document = ?request.document.as_ref().map(|d| d.as_str()),
            supervisor = self.supervisor.name(),
            code_len = request.source.len(),
            "Executing code"
        );

        let outcome = match self
            .workspaces
            .acquire(&request.caller, &request.source)
            .await
        {
            Ok(workspace) => {
                // A panic inside the supervisor drops the guard, which removes the file.
                let result = self.supervisor.run(workspace.path(), timeout).await;
                workspace.release().await;
                match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(caller = %request.caller, error = %e, "Supervisor failed");
                        ExecutionError::Internal(e.to_string()).into_outcome(0)
                    }
                }
            }
            Err(e) => {
                error!(caller = %request.caller, error = %e, "Failed to prepare workspace");
                ExecutionError::Workspace(e.to_string()).into_outcome(0)
            }
        };

        let duration_ms = elapsed_ms(start);
        let outcome = outcome.with_duration_ms(duration_ms);
        info!(
            caller = %request.caller,
            success = outcome.success,
            failure = ?outcome.failure,
            duration_ms,
            "Execution finished"
        );

        self.record(&request, &outcome).await;
        outcome
    }

    /// Best-effort history write: errors and slow stores are logged and
    /// swallowed so they can never change or delay the returned outcome
    /// beyond `history_timeout`.
    async fn record(&self, request: &ExecutionRequest, outcome: &ExecutionOutcome) {
        let (Some(history), Some(caller)) = (&self.history, request.caller.id()) else {
            return;
        };

        let write = history.record(
            caller,
            request.document.as_ref(),
            outcome,
            outcome.duration_ms,
        );
        match tokio::time::timeout(self.config.history_timeout, write).await {
            Ok(Ok(record_id)) => debug!(%caller, %record_id, "Recorded execution"),
            Ok(Err(e)) => warn!(%caller, error = %e, "Failed to record execution history"),
            Err(_) => warn!(
                %caller,
                timeout_ms = self.config.history_timeout.as_millis() as u64,
                "Timed out recording execution history"
            ),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
