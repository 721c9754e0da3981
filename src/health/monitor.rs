//! Active health monitor.
//!
//! Periodically probes every registered backend with a bare TCP connect and
//! writes the result into the shared registry.

use crate::backend::{BackendEndpoint, BackendRegistry};
use crate::config::HealthCheckConfig;
use crate::health::StatusReport;
use crate::metrics::MetricsCollector;
use futures::future::join_all;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a probe failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[from] io::Error),

    #[error("connection timeout after {0:?}")]
    Timeout(Duration),
}

/// Background task that keeps backend health flags current.
pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    metrics: MetricsCollector,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<BackendRegistry>,
        metrics: MetricsCollector,
        config: &HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            interval: config.interval,
            probe_timeout: config.timeout,
        }
    }

    /// Probe on every interval until shutdown.
    ///
    /// Backends start healthy, so the first round runs one interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            backends = self.registry.len(),
            interval = ?self.interval,
            timeout = ?self.probe_timeout,
            "health monitor starting"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_round().await.log();
                }

                _ = shutdown.recv() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Probe every backend once, update the registry, and report.
    ///
    /// Probes run concurrently and each is bounded by the probe timeout, so a
    /// round always completes within roughly one timeout.
    pub async fn probe_round(&self) -> StatusReport {
        let probes = self
            .registry
            .endpoints()
            .iter()
            .enumerate()
            .map(|(index, endpoint)| async move {
                (index, probe(endpoint, self.probe_timeout).await)
            });

        for (index, result) in join_all(probes).await {
            let endpoint = self.registry.endpoint(index);
            let healthy = result.is_ok();
            let was_healthy = self.registry.set_health(index, healthy);
            self.metrics.record_health_check(index, endpoint, healthy);

            match (was_healthy, result) {
                (true, Err(e)) => {
                    warn!(index, backend = %endpoint, error = %e, "backend marked unhealthy");
                }
                (false, Ok(())) => {
                    info!(index, backend = %endpoint, "backend marked healthy");
                }
                (_, Err(e)) => {
                    debug!(index, backend = %endpoint, error = %e, "backend still unhealthy");
                }
                (_, Ok(())) => {
                    debug!(index, backend = %endpoint, "health check passed");
                }
            }
        }

        let status = self.registry.status();
        self.metrics.observe_status(&status);
        StatusReport::new(status)
    }
}

/// Check that a backend accepts connections. No data is exchanged and the
/// connection is closed as soon as it is established.
pub async fn probe(endpoint: &BackendEndpoint, probe_timeout: Duration) -> Result<(), ProbeError> {
    match timeout(
        probe_timeout,
        TcpStream::connect((endpoint.host(), endpoint.port())),
    )
    .await
    {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::Timeout(probe_timeout)),
    }
}
