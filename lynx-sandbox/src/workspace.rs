//! Per-execution workspace files
//!
//! Every execution gets exactly one file under `<root>/<caller>/`. The file
//! name combines a strictly increasing millisecond stamp with a random UUID
//! so that concurrent acquisitions for one caller never collide, even when
//! the wall clock is coarser than the request rate or several processes
//! share the same root.

use crate::error::SandboxError;
use crate::Result;
use lynx_common::Caller;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_SEGMENT_LEN: usize = 64;

/// Guard for one workspace file.
///
/// Call [`Workspace::release`] once the interpreter is done. If the guard is
/// dropped without being released (early return, panic) the file is removed
/// synchronously in `Drop`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Failures are logged and left to the reaper.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(workspace = %self.path.display(), "Cleaned up workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(workspace = %self.path.display(), "Workspace already removed")
            }
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "Failed to clean up workspace, leaving it to the reaper"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!(
                workspace = %self.path.display(),
                "Workspace dropped without release, removed during unwind"
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "Failed to remove unreleased workspace"
            ),
        }
    }
}

/// Allocates and releases workspace files below a shared root
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    extension: String,
    last_stamp: AtomicI64,
}

impl WorkspaceManager {
    /// `root` is made absolute so the interpreter can run with any working directory
    pub fn new(root: impl AsRef<Path>, extension: impl Into<String>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self {
            root,
            extension: extension.into(),
            last_stamp: AtomicI64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `source` to a fresh owner-only file in the caller's directory
    pub async fn acquire(&self, caller: &Caller, source: &str) -> Result<Workspace> {
        let segment = caller_segment(caller);
        let dir = self.root.join(&segment);
        let path = dir.join(workspace_file_name(
            &segment,
            self.next_stamp(),
            &self.extension,
        ));

        ensure_private_dir(&dir).await?;
        let mut file = match create_private_file(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // the reaper removed the empty caller directory in between
                debug!(dir = %dir.display(), "Caller directory vanished, recreating");
                ensure_private_dir(&dir).await?;
                create_private_file(&path).await?
            }
            Err(e) => return Err(SandboxError::Io(e)),
        };

        let workspace = Workspace::new(path);
        file.write_all(source.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        debug!(
            caller = %caller,
            workspace = %workspace.path().display(),
            bytes = source.len(),
            "Created workspace"
        );
        Ok(workspace)
    }

    pub async fn release(&self, workspace: Workspace) {
        workspace.release().await;
    }

    /// Millisecond stamp that never repeats within this manager
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Directory name for a caller; anything outside `[A-Za-z0-9_-]` becomes `_`
pub(crate) fn caller_segment(caller: &Caller) -> String {
    match caller.id() {
        None => "anonymous".to_string(),
        Some(id) => {
            let cleaned: String = id
                .as_str()
                .chars()
                .take(MAX_SEGMENT_LEN)
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            if cleaned.is_empty() {
                "user-_".to_string()
            } else {
                format!("user-{}", cleaned)
            }
        }
    }
}

pub(crate) fn workspace_file_name(segment: &str, stamp: i64, extension: &str) -> String {
    format!("{}_{}_{}{}", segment, stamp, Uuid::new_v4().simple(), extension)
}

async fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

async fn create_private_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}
