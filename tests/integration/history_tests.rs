//! Best-effort history recording through the execution service

use crate::common::TestSandbox;
use async_trait::async_trait;
use lynx_common::{Caller, CallerId, DocumentId, ExecutionOutcome, HistorySink};
use lynx_history::{HistoryStore, Page};
use lynx_sandbox::ExecutionRequest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Always fails to persist
#[derive(Default)]
struct FailingSink {
    calls: AtomicUsize,
}

#[async_trait]
impl HistorySink for FailingSink {
    async fn record(
        &self,
        _caller: &CallerId,
        _document: Option<&DocumentId>,
        _outcome: &ExecutionOutcome,
        _duration_ms: u64,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("database is locked")
    }
}

/// Never answers
struct HangingSink;

#[async_trait]
impl HistorySink for HangingSink {
    async fn record(
        &self,
        _caller: &CallerId,
        _document: Option<&DocumentId>,
        _outcome: &ExecutionOutcome,
        _duration_ms: u64,
    ) -> anyhow::Result<String> {
        futures::future::pending::<()>().await;
        Ok(String::new())
    }
}

#[tokio::test]
async fn test_failing_history_does_not_change_outcome() {
    let sandbox = TestSandbox::new();
    let sink = Arc::new(FailingSink::default());
    let (service, _) = sandbox.service_with_history(sink.clone());

    let outcome = service
        .execute(ExecutionRequest::new("echo 1").with_caller(Caller::user("alice")))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.output, "1\n");
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hanging_history_is_bounded() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.history_timeout = Duration::from_millis(200);
    let (service, _) = sandbox.service_with_history(Arc::new(HangingSink));

    let start = Instant::now();
    let outcome = service
        .execute(ExecutionRequest::new("echo 1").with_caller(Caller::user("alice")))
        .await;

    assert!(outcome.success);
    assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    assert!(sandbox.workspace_files().is_empty());
}

#[tokio::test]
async fn test_anonymous_runs_are_not_recorded() {
    let sandbox = TestSandbox::new();
    let sink = Arc::new(FailingSink::default());
    let (service, _) = sandbox.service_with_history(sink.clone());

    let outcome = service.execute(ExecutionRequest::new("echo 1")).await;

    assert!(outcome.success);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failures_are_recorded_with_kind() {
    let sandbox = TestSandbox::new();
    let store = HistoryStore::in_memory().await.unwrap();
    let (service, _) = sandbox.service_with_history(Arc::new(store.clone()));

    service
        .execute(ExecutionRequest::new("exit 2").with_caller(Caller::user("alice")))
        .await;

    let page = store
        .list_for_caller(&CallerId::new("alice"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let record = &page.records[0];
    assert!(!record.success);
    assert_eq!(record.failure.as_deref(), Some("runtime"));
    assert_eq!(record.error.as_deref(), Some("Compiler exited with code 2"));
}

#[tokio::test]
async fn test_history_is_scoped_per_caller() {
    let sandbox = TestSandbox::new();
    let store = HistoryStore::in_memory().await.unwrap();
    let (service, _) = sandbox.service_with_history(Arc::new(store.clone()));

    for caller in ["alice", "bob", "bob"] {
        service
            .execute(
                ExecutionRequest::new("echo hi")
                    .with_caller(Caller::user(caller))
                    .with_document("shared-doc"),
            )
            .await;
    }

    let alice = CallerId::new("alice");
    let bob = CallerId::new("bob");
    let doc = DocumentId::new("shared-doc");

    let alice_page = store.list_for_document(&alice, &doc, Page::default()).await.unwrap();
    assert_eq!(alice_page.total, 1);
    assert!(alice_page.records.iter().all(|r| r.caller_id == "alice"));

    let bob_id = store
        .list_for_caller(&bob, Page::default())
        .await
        .unwrap()
        .records[0]
        .id
        .clone();
    assert!(store.get(&alice, &bob_id).await.unwrap().is_none());

    assert_eq!(store.delete_for_document(&alice, &doc).await.unwrap(), 1);
    assert_eq!(store.stats_for_document(&bob, &doc).await.unwrap().total, 2);
}
