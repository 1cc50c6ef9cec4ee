//! Cooperative shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set-once flag shared by every activity. Never reset.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether shutdown was requested.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
