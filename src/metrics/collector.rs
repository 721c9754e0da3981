//! Metrics collector using prometheus-client.
//!
//! Tracks dispatch outcomes, forwarded bytes, connections, and backend health.

use crate::backend::{BackendEndpoint, BackendStatus};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Identifies one registered backend. Endpoints may repeat, the index does not.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub index: String,
    pub endpoint: String,
}

impl BackendLabels {
    pub fn new(index: usize, endpoint: &BackendEndpoint) -> Self {
        Self {
            index: index.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Labels for dispatch metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub index: String,
    pub endpoint: String,
    pub outcome: RequestOutcome,
}

/// How an exchange with a chosen backend ended.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RequestOutcome {
    Proxied,
    Failed,
}

/// Labels for bytes transferred metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BytesLabels {
    pub index: String,
    pub endpoint: String,
    pub direction: Direction,
}

/// Direction of bytes transfer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Direction {
    /// Client to backend.
    Inbound,
    /// Backend to client.
    Outbound,
}

/// Labels for health check metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub index: String,
    pub endpoint: String,
    pub result: HealthCheckResult,
}

/// Result of a health check.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HealthCheckResult {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Exchanges per backend and outcome.
    requests_total: Family<RequestLabels, Counter>,
    /// Exchange duration histogram (in seconds).
    request_duration_seconds: Family<BackendLabels, Histogram>,
    /// `503 Service Unavailable` replies sent.
    unavailable_total: Counter,
    /// Client connections currently being dispatched.
    active_connections: Gauge,
    /// Client connections accepted.
    connections_total: Counter,
    /// Bytes forwarded per backend and direction.
    bytes_total: Family<BytesLabels, Counter>,
    /// Failed backend connects during dispatch.
    failover_total: Family<BackendLabels, Counter>,
    /// Backend health gauge (1 = healthy, 0 = unhealthy).
    backend_health: Family<BackendLabels, Gauge>,
    /// Cumulative proxied requests per backend, mirrored from the registry.
    backend_requests: Family<BackendLabels, Gauge>,
    /// Health probe results.
    health_checks_total: Family<HealthCheckLabels, Counter>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("healthlb");

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<BackendLabels, Histogram>::new_with_constructor(
            || {
                // Buckets: 1ms .. ~10s
                Histogram::new(exponential_buckets(0.001, 2.5, 11))
            },
        );
        let unavailable_total = Counter::default();
        let active_connections = Gauge::default();
        let connections_total = Counter::default();
        let bytes_total = Family::<BytesLabels, Counter>::default();
        let failover_total = Family::<BackendLabels, Counter>::default();
        let backend_health = Family::<BackendLabels, Gauge>::default();
        let backend_requests = Family::<BackendLabels, Gauge>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();

        registry.register(
            "requests",
            "Exchanges with a chosen backend, by outcome",
            requests_total.clone(),
        );
        registry.register(
            "request_duration_seconds",
            "Duration of a proxied exchange in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "unavailable_responses",
            "503 Service Unavailable replies sent to clients",
            unavailable_total.clone(),
        );
        registry.register(
            "active_connections",
            "Client connections currently being dispatched",
            active_connections.clone(),
        );
        registry.register(
            "connections",
            "Client connections accepted",
            connections_total.clone(),
        );
        registry.register("bytes", "Bytes forwarded", bytes_total.clone());
        registry.register(
            "failover_attempts",
            "Backend connect failures during dispatch",
            failover_total.clone(),
        );
        registry.register(
            "backend_health",
            "Backend health status (1=healthy, 0=unhealthy)",
            backend_health.clone(),
        );
        registry.register(
            "backend_requests",
            "Cumulative proxied requests per backend",
            backend_requests.clone(),
        );
        registry.register(
            "health_checks",
            "Health probes performed",
            health_checks_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                unavailable_total,
                active_connections,
                connections_total,
                bytes_total,
                failover_total,
                backend_health,
                backend_requests,
                health_checks_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed exchange with a chosen backend.
    pub fn record_exchange(
        &self,
        index: usize,
        endpoint: &BackendEndpoint,
        bytes_to_backend: u64,
        bytes_to_client: u64,
        duration: Duration,
    ) {
        let labels = BackendLabels::new(index, endpoint);
        self.inner
            .requests_total
            .get_or_create(&RequestLabels {
                index: labels.index.clone(),
                endpoint: labels.endpoint.clone(),
                outcome: RequestOutcome::Proxied,
            })
            .inc();
        self.inner
            .request_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());

        for (direction, bytes) in [
            (Direction::Inbound, bytes_to_backend),
            (Direction::Outbound, bytes_to_client),
        ] {
            self.inner
                .bytes_total
                .get_or_create(&BytesLabels {
                    index: labels.index.clone(),
                    endpoint: labels.endpoint.clone(),
                    direction,
                })
                .inc_by(bytes);
        }
    }

    /// Record an exchange that broke off part-way.
    pub fn record_exchange_failure(&self, index: usize, endpoint: &BackendEndpoint) {
        let labels = BackendLabels::new(index, endpoint);
        self.inner
            .requests_total
            .get_or_create(&RequestLabels {
                index: labels.index,
                endpoint: labels.endpoint,
                outcome: RequestOutcome::Failed,
            })
            .inc();
    }

    /// Record a failed backend connect that triggered failover.
    pub fn record_failover(&self, index: usize, endpoint: &BackendEndpoint) {
        self.inner
            .failover_total
            .get_or_create(&BackendLabels::new(index, endpoint))
            .inc();
    }

    /// Record a `503 Service Unavailable` reply.
    pub fn record_unavailable(&self) {
        self.inner.unavailable_total.inc();
    }

    /// Increment active connections.
    pub fn connection_opened(&self) {
        self.inner.active_connections.inc();
        self.inner.connections_total.inc();
    }

    /// Decrement active connections.
    pub fn connection_closed(&self) {
        self.inner.active_connections.dec();
    }

    /// Record a health probe result.
    pub fn record_health_check(&self, index: usize, endpoint: &BackendEndpoint, success: bool) {
        let labels = HealthCheckLabels {
            index: index.to_string(),
            endpoint: endpoint.to_string(),
            result: if success {
                HealthCheckResult::Success
            } else {
                HealthCheckResult::Failure
            },
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }

    /// Mirror registry state into the health and request gauges.
    pub fn observe_status(&self, status: &[BackendStatus]) {
        for backend in status {
            let labels = BackendLabels::new(backend.index, &backend.endpoint);
            self.inner
                .backend_health
                .get_or_create(&labels)
                .set(i64::from(backend.healthy));
            self.inner
                .backend_requests
                .get_or_create(&labels)
                .set(i64::try_from(backend.request_count).unwrap_or(i64::MAX));
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
