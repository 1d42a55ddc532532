//! Background sweep for orphaned workspace files
//!
//! Per-call cleanup cannot cover a crash or restart in the middle of an
//! execution. The reaper deletes anything under the workspace root whose
//! modification time is older than the retention window, and removes caller
//! directories that have been empty for at least as long.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub removed_dirs: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct WorkspaceReaper {
    root: PathBuf,
    retention: Duration,
    interval: Duration,
}

impl WorkspaceReaper {
    pub fn new(root: impl Into<PathBuf>, retention: Duration, interval: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
            interval,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sweep the root once. Individual failures are counted, never fatal.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = SystemTime::now();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Failed to read workspace root");
                report.failed += 1;
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "Failed to list workspace root");
                    report.failed += 1;
                    break;
                }
            };
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => self.sweep_caller_dir(&path, now, &mut report).await,
                Ok(_) => {
                    self.reap_file(&path, now, &mut report).await;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to inspect workspace entry");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                root = %self.root.display(),
                scanned = report.scanned,
                removed = report.removed,
                removed_dirs = report.removed_dirs,
                failed = report.failed,
                "Swept stale workspaces"
            );
        } else {
            debug!(root = %self.root.display(), scanned = report.scanned, "Nothing to sweep");
        }
        report
    }

    async fn sweep_caller_dir(&self, dir: &Path, now: SystemTime, report: &mut SweepReport) {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to read caller directory");
                report.failed += 1;
                return;
            }
        };
        let mut remaining = 0usize;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if !self.reap_file(&entry.path(), now, report).await {
                        remaining += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to list caller directory");
                    report.failed += 1;
                    return;
                }
            }
        }

        // Deleting files bumps the directory mtime, so a directory emptied by
        // this sweep survives until a later one.
        if remaining == 0 && self.is_stale(dir, now).await {
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => {
                    debug!(dir = %dir.display(), "Removed empty caller directory");
                    report.removed_dirs += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                // a new workspace landed in between
                Err(e) if is_not_empty(&e) => {}
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to remove caller directory");
                    report.failed += 1;
                }
            }
        }
    }

    /// Returns true when the file is gone afterwards
    async fn reap_file(&self, path: &Path, now: SystemTime, report: &mut SweepReport) -> bool {
        report.scanned += 1;
        if !self.is_stale(path, now).await {
            return false;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale workspace");
                report.removed += 1;
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove stale workspace");
                report.failed += 1;
                false
            }
        }
    }

    async fn is_stale(&self, path: &Path, now: SystemTime) -> bool {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        // mtimes in the future count as fresh
        now.duration_since(modified)
            .map(|age| age > self.retention)
            .unwrap_or(false)
    }

    /// Sweep now, then every `interval` until the handle is shut down
    pub fn spawn(self) -> ReaperHandle {
        let token = CancellationToken::new();
        let shutdown = token.clone();
        let join = tokio::spawn(async move {
            info!(
                root = %self.root.display(),
                retention_secs = self.retention.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Workspace reaper started"
            );
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            info!(root = %self.root.display(), "Workspace reaper stopped");
        });
        ReaperHandle { token, join }
    }
}

fn is_not_empty(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::ENOTEMPTY)
    }
    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}

/// Running reaper task
pub struct ReaperHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stop the reaper and wait for an in-progress sweep to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Workspace reaper task failed");
        }
    }
}
