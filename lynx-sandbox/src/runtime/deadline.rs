use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Sleep;

/// Wall-clock deadline for one interpreter run.
///
/// Arming increments a shared gauge and disarming decrements it exactly
/// once, whether `disarm` is called explicitly or the deadline is dropped.
/// A non-zero gauge after all runs have returned means a timer leaked.
pub(crate) struct Deadline {
    sleep: Pin<Box<Sleep>>,
    gauge: Option<Arc<AtomicUsize>>,
}

impl Deadline {
    pub(crate) fn arm(timeout: Duration, gauge: Arc<AtomicUsize>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self {
            sleep: Box::pin(tokio::time::sleep(timeout)),
            gauge: Some(gauge),
        }
    }

    /// Resolves when the deadline passes
    pub(crate) async fn expired(&mut self) {
        self.sleep.as_mut().await
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(gauge) = self.gauge.take() {
            gauge.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.gauge.is_some()
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.disarm();
    }
}
