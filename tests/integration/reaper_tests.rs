//! Reaper running next to a live service

use crate::common::{wait_until, TestSandbox};
use lynx_common::Caller;
use lynx_sandbox::{ExecutionRequest, ExecutionService};
use std::fs::File;
use std::time::{Duration, SystemTime};

fn backdate(path: &std::path::Path, by: Duration) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - by)
        .unwrap();
}

#[tokio::test]
async fn test_reaper_removes_orphans_from_a_crash() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.retention = Duration::from_secs(60);
    sandbox.config.sweep_interval = Duration::from_millis(50);
    let (service, _) = sandbox.service();

    // leftovers of a process that died mid-execution
    let caller_dir = sandbox.root().join("user-alice");
    std::fs::create_dir_all(&caller_dir).unwrap();
    let orphan = caller_dir.join("user-alice_1_deadbeef.lynx");
    let recent = caller_dir.join("user-alice_2_cafebabe.lynx");
    std::fs::write(&orphan, "echo lost").unwrap();
    std::fs::write(&recent, "echo in flight").unwrap();
    backdate(&orphan, Duration::from_secs(120));

    let handle = service.spawn_reaper();
    assert!(wait_until(Duration::from_secs(2), || !orphan.exists()).await);
    assert!(recent.exists());

    // the service keeps working while the reaper runs
    let outcome = service
        .execute(ExecutionRequest::new("echo 1").with_caller(Caller::user("alice")))
        .await;
    assert!(outcome.success);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_single_sweep_reports_counts() {
    let mut sandbox = TestSandbox::new();
    sandbox.config.retention = Duration::from_secs(60);
    let (service, _) = sandbox.service();

    std::fs::create_dir_all(sandbox.root()).unwrap();
    let stale = sandbox.root().join("anonymous_1_feedface.lynx");
    std::fs::write(&stale, "echo 1").unwrap();
    backdate(&stale, Duration::from_secs(600));

    let report = service.reaper().sweep().await;

    assert_eq!(report.scanned, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 0);
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_retention_shorter_than_a_run_is_refused() {
    let mut sandbox = TestSandbox::new();

    // a zero window would let a sweep delete the file of a running script
    sandbox.config.retention = Duration::ZERO;
    assert!(ExecutionService::with_process_supervisor(sandbox.config.clone()).is_err());

    sandbox.config.retention = sandbox.config.timeout;
    assert!(ExecutionService::with_process_supervisor(sandbox.config.clone()).is_err());

    // with a valid window an in-flight workspace survives a sweep
    sandbox.config.retention = Duration::from_secs(60);
    let (service, _) = sandbox.service();
    let service = std::sync::Arc::new(service);
    let run = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(ExecutionRequest::new("sleep 1; cat \"$0\"").with_caller(Caller::user("alice")))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = service.reaper().sweep().await;
    assert_eq!(report.removed, 0);

    let outcome = run.await.unwrap();
    assert!(outcome.success, "unexpected failure: {:?}", outcome.error);
    assert!(outcome.output.starts_with("sleep 1;"));
}
