//! Frontend listener implementation.
//!
//! Accepts incoming connections and hands each one to a detached dispatch task.

use crate::config::ListenerConfig;
use super::dispatcher::duration_ms;
use crate::frontend::Dispatcher;
use crate::metrics::MetricsCollector;
use crate::util::ConnectionId;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Frontend listener that accepts and dispatches connections.
pub struct FrontendListener {
    /// Bound listening socket.
    listener: TcpListener,
    /// Shared dispatcher, cloned into each connection task.
    dispatcher: Dispatcher,
}

impl FrontendListener {
    /// Bind the listening socket. Must be called from within a tokio runtime.
    pub async fn bind(config: &ListenerConfig, dispatcher: Dispatcher) -> io::Result<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::from_std(bind_socket(addr, config.backlog)?)?;

        info!(
            listen = %listener.local_addr()?,
            backlog = config.backlog,
            backends = dispatcher.registry().len(),
            "frontend listener bound"
        );

        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// Address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn a detached task for one accepted connection.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let dispatcher = self.dispatcher.clone();
        let id = ConnectionId::next();
        let span = info_span!("connection", id = %id, client = %client_addr);
        let guard = ActiveConnection::open(dispatcher.metrics().clone());

        tokio::spawn(
            async move {
                let start = Instant::now();
                let outcome = dispatcher.dispatch(stream, &id).await;
                drop(guard);

                debug!(
                    outcome = ?outcome,
                    duration_ms = duration_ms(start.elapsed()),
                    "connection completed"
                );
            }
            .instrument(span),
        );
    }
}

/// Keeps the active-connection gauge balanced even if the task panics.
struct ActiveConnection {
    metrics: MetricsCollector,
}

impl ActiveConnection {
    fn open(metrics: MetricsCollector) -> Self {
        metrics.connection_opened();
        Self { metrics }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.metrics.connection_closed();
    }
}

/// Create a non-blocking listening socket with an explicit backlog.
fn bind_socket(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}
