//! Per-connection dispatch: pick a healthy backend, fail over, proxy once.

use crate::backend::{BackendRegistry, RoundRobinCursor};
use crate::config::ProxyConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{connect_to_backend, exchange_once, ExchangeResult};
use crate::util::ConnectionId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Reply sent when no backend can take the connection.
pub const SERVICE_UNAVAILABLE: &[u8] = b"503 Service Unavailable\n";

/// How one dispatch attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The exchange with `backend` completed and was counted.
    Proxied {
        backend: usize,
        result: ExchangeResult,
    },
    /// Connected to `backend` but the exchange broke off part-way.
    ExchangeFailed { backend: usize },
    /// The healthy snapshot was empty; no backend was contacted.
    NoHealthyBackend,
    /// Every backend in the snapshot refused or timed out.
    AllBackendsFailed { attempted: usize },
}

/// Dispatches client connections across the registry.
///
/// Cheap to clone; every clone shares the same registry, cursor and metrics.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    cursor: Arc<RoundRobinCursor>,
    metrics: MetricsCollector,
    settings: ProxyConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<BackendRegistry>,
        cursor: Arc<RoundRobinCursor>,
        metrics: MetricsCollector,
        settings: ProxyConfig,
    ) -> Self {
        Self {
            registry,
            cursor,
            metrics,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Handle one client connection to completion.
    ///
    /// The client stream and any backend stream are dropped, and so closed,
    /// on every path out of this function.
    pub async fn dispatch<S>(&self, mut client: S, id: &ConnectionId) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let healthy = self.registry.snapshot_healthy();
        let candidates = self.cursor.candidates(&healthy);

        if candidates.is_empty() {
            warn!(connection = %id, "no healthy backend available");
            self.reply_unavailable(&mut client, id).await;
            return DispatchOutcome::NoHealthyBackend;
        }

        let Some((index, mut backend)) = self.connect_first(&candidates, id).await else {
            warn!(
                connection = %id,
                attempted = candidates.len(),
                "all healthy backends failed to connect"
            );
            self.reply_unavailable(&mut client, id).await;
            return DispatchOutcome::AllBackendsFailed {
                attempted: candidates.len(),
            };
        };

        let endpoint = self.registry.endpoint(index);
        let start = Instant::now();

        match exchange_once(
            &mut client,
            &mut backend,
            self.settings.buffer_size,
            self.settings.io_timeout,
        )
        .await
        {
            Ok(result) => {
                self.registry.increment_request_count(index);
                self.metrics.record_exchange(
                    index,
                    endpoint,
                    result.bytes_to_backend,
                    result.bytes_to_client,
                    start.elapsed(),
                );

                info!(
                    connection = %id,
                    backend = %endpoint,
                    bytes_to_backend = result.bytes_to_backend,
                    bytes_to_client = result.bytes_to_client,
                    duration_ms = duration_ms(start.elapsed()),
                    "request proxied"
                );

                DispatchOutcome::Proxied {
                    backend: index,
                    result,
                }
            }
            Err(e) => {
                self.metrics.record_exchange_failure(index, endpoint);
                warn!(connection = %id, backend = %endpoint, error = %e, "exchange failed");
                DispatchOutcome::ExchangeFailed { backend: index }
            }
        }
    }

    /// Try `candidates` in order and return the first backend that accepts.
    async fn connect_first(
        &self,
        candidates: &[usize],
        id: &ConnectionId,
    ) -> Option<(usize, TcpStream)> {
        for &index in candidates {
            let endpoint = self.registry.endpoint(index);

            match connect_to_backend(endpoint, self.settings.connect_timeout).await {
                Ok(stream) => {
                    debug!(connection = %id, backend = %endpoint, "connected to backend");
                    return Some((index, stream));
                }
                Err(e) => {
                    self.metrics.record_failover(index, endpoint);
                    warn!(connection = %id, error = %e, "backend failed, trying next");
                }
            }
        }

        None
    }

    async fn reply_unavailable<S>(&self, client: &mut S, id: &ConnectionId)
    where
        S: AsyncWrite + Unpin,
    {
        self.metrics.record_unavailable();

        let write = client.write_all(SERVICE_UNAVAILABLE);
        let result = match self.settings.io_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .unwrap_or_else(|_| Err(std::io::ErrorKind::TimedOut.into())),
            None => write.await,
        };

        if let Err(e) = result {
            debug!(connection = %id, error = %e, "failed to send 503 to client");
        }
    }
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub(super) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
