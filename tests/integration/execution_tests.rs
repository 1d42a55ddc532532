//! End-to-end executions through the process supervisor

use crate::common::{setup_test_logging, TestSandbox};
use assert_matches::assert_matches;
use lynx_common::{Caller, FailureKind};
use lynx_history::{HistoryStore, Page};
use lynx_sandbox::{ExecutionRequest, ExecutionService};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_successful_run_is_recorded_once() {
    setup_test_logging();
    let sandbox = TestSandbox::new();
    let store = HistoryStore::in_memory().await.unwrap();
    let (service, _) = sandbox.service_with_history(Arc::new(store.clone()));

    let request = ExecutionRequest::new("echo 1")
        .with_caller(Caller::user("alice"))
        .with_document("doc-1");
    let outcome = service.execute(request).await;

    assert!(outcome.success, "unexpected failure: {:?}", outcome.error);
    assert_eq!(outcome.output, "1\n");
    assert_eq!(outcome.error, None);
    assert!(sandbox.workspace_files().is_empty());

    let caller = lynx_common::CallerId::new("alice");
    let page = store.list_for_caller(&caller, Page::default()).await.unwrap();
    assert_eq!(page.total, 1);
    let record = &page.records[0];
    assert!(record.success);
    assert_eq!(record.document_id.as_deref(), Some("doc-1"));
    assert_eq!(record.output.as_deref(), Some("1\n"));
    assert!(record.duration_ms >= 0);
}

#[tokio::test]
async fn test_oversized_source_leaves_no_trace() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.max_source_bytes = 16;
    let store = HistoryStore::in_memory().await.unwrap();
    let (service, _) = sandbox.service_with_history(Arc::new(store.clone()));

    let outcome = service
        .execute(
            ExecutionRequest::new("echo 'this is far too long'")
                .with_caller(Caller::user("alice")),
        )
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Code is too large"));
    assert_eq!(outcome.failure, Some(FailureKind::Validation));
    assert!(sandbox.workspace_files().is_empty());
    let stats = store
        .stats_for_caller(&lynx_common::CallerId::new("alice"))
        .await
        .unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn test_validation_messages() {
    let sandbox = TestSandbox::new();
    let (service, _) = sandbox.service();

    let empty = service.execute(ExecutionRequest::new("  \n\t")).await;
    assert_eq!(empty.error.as_deref(), Some("Code cannot be empty"));

    let nul = service.execute(ExecutionRequest::new("echo a\0b")).await;
    assert_eq!(nul.error.as_deref(), Some("Code contains null bytes"));

    let bell = service.execute(ExecutionRequest::new("echo a\x07b")).await;
    assert_eq!(
        bell.error.as_deref(),
        Some("Code contains invalid control characters")
    );
    assert_eq!(bell.failure, Some(FailureKind::Validation));

    let tabs = service.execute(ExecutionRequest::new("\techo ok\r\n")).await;
    assert!(tabs.success, "unexpected failure: {:?}", tabs.error);
    assert!(sandbox.workspace_files().is_empty());
}

#[tokio::test]
async fn test_runtime_failure_composes_stderr() {
    let sandbox = TestSandbox::new();
    let (service, _) = sandbox.service();

    let outcome = service
        .execute(ExecutionRequest::new("echo partial\necho 'syntax error' >&2\nexit 3"))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::Runtime));
    assert_eq!(
        outcome.error.as_deref(),
        Some("Compiler exited with code 3\nsyntax error")
    );
    assert!(sandbox.workspace_files().is_empty());
}

#[tokio::test]
async fn test_misconfigured_interpreter_is_startup_failure() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.interpreter_path = sandbox.scratch().join("missing-lynx");
    let (service, _) = sandbox.service();

    let outcome = service.execute(ExecutionRequest::new("echo 1")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::Startup));
    assert_matches!(
        outcome.error.as_deref(),
        Some(message) if message.starts_with("Failed to start compiler: ")
    );
    assert!(sandbox.workspace_files().is_empty());
}

#[tokio::test]
async fn test_hanging_interpreter_times_out() {
    setup_test_logging();
    let mut sandbox = TestSandbox::new();
    sandbox.config.timeout = Duration::from_millis(300);
    let (service, supervisor) = sandbox.service();

    let start = Instant::now();
    let outcome = service
        .execute(ExecutionRequest::new("echo started\nwhile :; do :; done"))
        .await;
    let elapsed = start.elapsed();

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Execution timed out"));
    assert_eq!(outcome.failure, Some(FailureKind::Timeout));
    assert_eq!(outcome.output, "");
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert!(sandbox.workspace_files().is_empty());
    assert_eq!(supervisor.armed_deadlines(), 0);
}

#[tokio::test]
async fn test_request_timeout_never_exceeds_configured_ceiling() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.timeout = Duration::from_millis(300);
    let (service, _) = sandbox.service();

    let start = Instant::now();
    let outcome = service
        .execute(ExecutionRequest::new("sleep 5").with_timeout(Duration::from_secs(60)))
        .await;

    assert!(outcome.is_timeout());
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_output_over_limit_fails() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.max_output_bytes = 1024;
    let (service, _) = sandbox.service();

    let outcome = service
        .execute(ExecutionRequest::new(
            "i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done",
        ))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::OutputLimit));
    assert_eq!(outcome.error.as_deref(), Some("Output too large"));
    assert!(sandbox.workspace_files().is_empty());
}

#[tokio::test]
async fn test_unwritable_root_is_workspace_failure() {
    let sandbox = TestSandbox::new();
    // a regular file where the root directory should be
    let blocked = sandbox.scratch().join("blocked");
    std::fs::write(&blocked, "").unwrap();
    let config = sandbox.config.clone().with_workspace_root(&blocked);
    let service = ExecutionService::with_process_supervisor(config).unwrap();

    let outcome = service
        .execute(ExecutionRequest::new("echo 1").with_caller(Caller::user("alice")))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::Workspace));
}
