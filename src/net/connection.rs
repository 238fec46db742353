//! In-flight request tracking.
//!
//! The frontend drains through axum's graceful shutdown; this tracker only
//! reports how much work is still outstanding so shutdown can log it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts requests currently being relayed.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active_count: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new in-flight request. The returned guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active_count: Arc::clone(&self.active_count),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard held for the lifetime of one relayed request.
#[derive(Debug)]
pub struct InFlightGuard {
    active_count: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}
