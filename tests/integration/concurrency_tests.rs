//! Parallel executions and cleanup under failure

use crate::common::{setup_test_logging, TestSandbox};
use async_trait::async_trait;
use futures::future::join_all;
use lynx_common::{Caller, ExecutionOutcome};
use lynx_sandbox::{ExecutionRequest, ExecutionService, Supervisor};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_caller_runs_never_collide() {
    setup_test_logging();
    let sandbox = TestSandbox::new();
    let (service, supervisor) = sandbox.service();
    let service = Arc::new(service);

    let runs = (0..50).map(|_| {
        let service = service.clone();
        async move {
            service
                .execute(ExecutionRequest::new("echo \"$0\"").with_caller(Caller::user("alice")))
                .await
        }
    });
    let outcomes = join_all(runs).await;

    let mut paths = HashSet::new();
    for outcome in &outcomes {
        assert!(outcome.success, "unexpected failure: {:?}", outcome.error);
        let path = PathBuf::from(outcome.output.trim_end());
        assert!(path.starts_with(sandbox.root().join("user-alice")));
        assert!(!path.exists());
        paths.insert(path);
    }
    assert_eq!(paths.len(), 50);
    assert!(sandbox.workspace_files().is_empty());
    assert_eq!(supervisor.armed_deadlines(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_deadline_outlives_mixed_runs() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.timeout = Duration::from_millis(1500);
    let (service, supervisor) = sandbox.service();
    let service = Arc::new(service);

    let sources = ["echo ok", "exit 7", "sleep 5", "kill -9 $$", "echo oops >&2; exit 1"];
    let runs = sources.iter().cycle().take(20).map(|source| {
        let service = service.clone();
        let source = source.to_string();
        async move { service.execute(ExecutionRequest::new(source)).await }
    });
    let outcomes = join_all(runs).await;

    assert_eq!(outcomes.iter().filter(|o| o.success).count(), 4);
    assert_eq!(outcomes.iter().filter(|o| o.is_timeout()).count(), 4);
    assert_eq!(supervisor.armed_deadlines(), 0);
    assert!(sandbox.workspace_files().is_empty());
}

/// Panics while the workspace is still on disk
struct PanickingSupervisor {
    seen: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl Supervisor for PanickingSupervisor {
    async fn run(&self, workspace: &Path, _timeout: Duration) -> lynx_sandbox::Result<ExecutionOutcome> {
        assert!(workspace.exists());
        *self.seen.lock().unwrap() = Some(workspace.to_path_buf());
        panic!("supervisor blew up");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

#[tokio::test]
async fn test_supervisor_panic_still_removes_workspace() {
    let sandbox = TestSandbox::new();
    let supervisor = Arc::new(PanickingSupervisor {
        seen: Mutex::new(None),
    });
    let service = Arc::new(ExecutionService::new(sandbox.config.clone(), supervisor.clone()).unwrap());

    let task = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(ExecutionRequest::new("echo 1").with_caller(Caller::user("bob")))
                .await
        })
    };
    let joined = task.await;

    assert!(joined.unwrap_err().is_panic());
    let seen = supervisor.seen.lock().unwrap().clone().unwrap();
    assert!(!seen.exists());
    assert!(sandbox.workspace_files().is_empty());
}

/// Returns `Err` as if its own machinery had failed
struct BrokenSupervisor;

#[async_trait]
impl Supervisor for BrokenSupervisor {
    async fn run(&self, _workspace: &Path, _timeout: Duration) -> lynx_sandbox::Result<ExecutionOutcome> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "pipe exploded").into())
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn test_supervisor_error_is_internal_failure() {
    let sandbox = TestSandbox::new();
    let service = ExecutionService::new(sandbox.config.clone(), BrokenSupervisor).unwrap();

    let outcome = service.execute(ExecutionRequest::new("echo 1")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(lynx_common::FailureKind::Internal));
    assert!(outcome.error.unwrap().contains("pipe exploded"));
    assert!(sandbox.workspace_files().is_empty());
}
