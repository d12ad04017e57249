//! Request-count metrics (§1: out of scope as a subsystem, interface only;
//! grounded on `metrics.go`). The dispatch handler (§4.4) increments these;
//! the built-in `Metrics` method (§6, `builtin.rs`) reports a snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per dispatched message, before the outcome is known.
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Called once per dispatched message, with the final outcome.
    pub fn record_outcome(&self, succeeded: bool) {
        if succeeded {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.success.load(Ordering::Relaxed),
            failed_requests: self.failure.load(Ordering::Relaxed),
        }
    }
}
