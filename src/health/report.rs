//! Periodic status report.

use crate::backend::BackendStatus;
use tracing::info;

/// Health and cumulative request count for every backend after a probe round.
#[derive(Debug, Clone)]
pub struct StatusReport {
    backends: Vec<BackendStatus>,
}

impl StatusReport {
    pub fn new(backends: Vec<BackendStatus>) -> Self {
        Self { backends }
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.healthy).count()
    }

    pub fn total_requests(&self) -> u64 {
        self.backends.iter().map(|b| b.request_count).sum()
    }

    /// Emit one event per backend followed by a summary event.
    pub fn log(&self) {
        for backend in &self.backends {
            info!(
                index = backend.index,
                backend = %backend.endpoint,
                healthy = backend.healthy,
                requests = backend.request_count,
                "backend status"
            );
        }

        info!(
            healthy = self.healthy_count(),
            backends = self.backends.len(),
            requests = self.total_requests(),
            "health check round complete"
        );
    }
}
