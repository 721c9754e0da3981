//! Startup and shutdown of the running balancer.

use crate::config::Config;
use crate::frontend::FrontendListener;
use crate::metrics::MetricsServer;
use crate::state::AppState;
use std::io;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::info;

/// A started balancer: listener bound, background tasks running.
pub struct LoadBalancer {
    state: AppState,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl LoadBalancer {
    /// Bind the listener, then start the health monitor, the optional metrics
    /// endpoint and the accept loop, in that order.
    ///
    /// A bind failure is returned before any task is spawned.
    pub async fn start(config: Config) -> io::Result<Self> {
        let state = AppState::new(config);
        let listener = FrontendListener::bind(&state.config().listener, state.dispatcher()).await?;
        let local_addr = listener.local_addr()?;

        let mut tasks = Vec::new();

        let monitor = state.health_monitor();
        tasks.push(tokio::spawn(monitor.run(state.shutdown().subscribe())));

        let metrics_config = &state.config().global.metrics;
        if metrics_config.enabled {
            let server = MetricsServer::new(
                metrics_config.address,
                metrics_config.path.clone(),
                state.metrics().clone(),
            );
            tasks.push(tokio::spawn(server.run(state.shutdown().subscribe())));
        }

        tasks.push(tokio::spawn(listener.run(state.shutdown().subscribe())));

        info!(
            instance = %state.instance_id(),
            listen = %local_addr,
            backends = state.registry().len(),
            "healthlb is running"
        );

        Ok(Self {
            state,
            local_addr,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop accepting, stop probing, and wait for those tasks to finish.
    ///
    /// Connections already being dispatched are not waited for.
    pub async fn shutdown(self) {
        self.state.trigger_shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("healthlb shut down complete");
    }
}
