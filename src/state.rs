//! Shared application state.

use crate::backend::{BackendRegistry, RoundRobinCursor};
use crate::config::Config;
use crate::frontend::Dispatcher;
use crate::health::HealthMonitor;
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use std::sync::Arc;
use uuid::Uuid;

/// Components shared by the accept loop, the dispatch tasks and the health
/// monitor. Created once at startup; the backend set never changes afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Identifies this balancer process in logs shared with other instances.
    instance_id: Uuid,

    /// Startup configuration.
    config: Arc<Config>,

    /// Backend pool with health flags and request counts.
    registry: Arc<BackendRegistry>,

    /// Round-robin position shared by all dispatches.
    cursor: Arc<RoundRobinCursor>,

    /// Metrics collector.
    metrics: MetricsCollector,

    /// Shutdown signal.
    shutdown: ShutdownSignal,
}

impl AppState {
    /// Create application state from a validated configuration.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(BackendRegistry::from_config(&config.backends));
        Self {
            instance_id: Uuid::new_v4(),
            config: Arc::new(config),
            registry,
            cursor: Arc::new(RoundRobinCursor::new()),
            metrics: MetricsCollector::new(),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Dispatcher wired to the shared registry and cursor.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.cursor),
            self.metrics.clone(),
            self.config.proxy.clone(),
        )
    }

    /// Health monitor wired to the shared registry.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.registry),
            self.metrics.clone(),
            &self.config.health_check,
        )
    }

    /// Trigger shutdown.
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_share_registry() {
        let state = AppState::new(Config::default());
        let dispatcher = state.dispatcher();

        state.registry().set_health(2, false);

        assert_eq!(state.registry().len(), 3);
        assert_eq!(dispatcher.registry().snapshot_healthy(), vec![0, 1]);
        assert!(Arc::ptr_eq(dispatcher.registry(), state.registry()));
    }

    #[test]
    fn test_instance_id_per_state() {
        let a = AppState::new(Config::default());
        let b = AppState::new(Config::default());

        assert_ne!(a.instance_id(), b.instance_id());
        assert_eq!(a.clone().instance_id(), a.instance_id());
    }
}
