//! Common test utilities shared across integration tests

use lynx_sandbox::{ExecutionService, HistorySink, ProcessSupervisor, SandboxConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Interpreter used by the tests: submitted sources are shell scripts and
/// `$0` is the workspace path.
pub const SHELL: &str = "/bin/sh";

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Isolated workspace root plus a config pointing at `/bin/sh`
pub struct TestSandbox {
    dir: TempDir,
    pub config: SandboxConfig,
}

impl TestSandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = SandboxConfig::default()
            .with_interpreter(SHELL)
            .with_workspace_root(dir.path().join("workspaces"))
            .with_timeout(Duration::from_secs(10))
            .with_history_timeout(Duration::from_millis(500));
        config.kill_grace = Duration::from_millis(500);
        Self { dir, config }
    }

    pub fn root(&self) -> PathBuf {
        self.config.workspace_root.clone()
    }

    pub fn scratch(&self) -> &Path {
        self.dir.path()
    }

    /// Service with a process supervisor the test can still observe
    pub fn service(&self) -> (ExecutionService, Arc<ProcessSupervisor>) {
        let supervisor = Arc::new(
            ProcessSupervisor::from_config(&self.config).with_working_dir(self.scratch()),
        );
        let service = ExecutionService::new(self.config.clone(), supervisor.clone())
            .expect("Failed to build execution service");
        (service, supervisor)
    }

    pub fn service_with_history(
        &self,
        history: Arc<dyn HistorySink>,
    ) -> (ExecutionService, Arc<ProcessSupervisor>) {
        let (service, supervisor) = self.service();
        (service.with_history(history), supervisor)
    }

    /// Every regular file under the workspace root
    pub fn workspace_files(&self) -> Vec<PathBuf> {
        list_files(&self.root())
    }
}

impl Default for TestSandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(list_files(&path));
        } else {
            files.push(path);
        }
    }
    files
}

/// Poll `condition` every 20ms for up to `limit`
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
