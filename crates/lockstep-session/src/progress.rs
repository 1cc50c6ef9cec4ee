//! Driver iteration progress.
//!
//! The request driver records every completed iteration here so control
//! activities can wait for the driver to run while a breakpoint is set.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    completed: AtomicU64,
    finished: AtomicBool,
    notify: Notify,
}

/// Shared counter of completed driver iterations.
#[derive(Debug, Clone, Default)]
pub struct DriverProgress {
    inner: Arc<Inner>,
}

impl DriverProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterations completed so far.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Whether the driver loop has exited.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Record one completed iteration. Called from the driver thread.
    pub fn record(&self) {
        self.inner.completed.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_waiters();
    }

    /// Mark the driver as stopped; wakes every waiter.
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// A guard that calls [`finish`](Self::finish) when dropped, including
    /// during a panic unwind.
    pub fn finish_on_drop(&self) -> FinishGuard {
        FinishGuard {
            progress: self.clone(),
        }
    }

    /// Wait until at least `target` iterations completed, the driver
    /// stopped, or `limit` elapsed. Returns whether `target` was reached.
    pub async fn wait_for(&self, target: u64, limit: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.notify.notified();
                if self.completed() >= target || self.is_finished() {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(limit, wait).await;
        self.completed() >= target
    }
}

/// Marks the driver finished on drop.
pub struct FinishGuard {
    progress: DriverProgress,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.progress.finish();
    }
}
