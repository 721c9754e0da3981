//! Integration tests for healthlb.
//!
//! These run the full balancer on loopback against small echo backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use healthlb::config::{BackendConfig, Config};
use healthlb::frontend::SERVICE_UNAVAILABLE;
use healthlb::LoadBalancer;

/// Echo backend that behaves like the `echo-backend` binary.
struct EchoBackend {
    port: u16,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl EchoBackend {
    async fn start() -> Self {
        Self::start_on(0).await
    }

    async fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1023];
                    if let Ok(n) = stream.read(&mut buf).await {
                        if n > 0 {
                            let text = String::from_utf8_lossy(&buf[..n]);
                            let reply = format!("Echo from port: {}:{}", port, text);
                            let _ = stream.write_all(reply.as_bytes()).await;
                        }
                    }
                });
            }
        });

        Self {
            port,
            accepted,
            handle,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn config(&self) -> BackendConfig {
        BackendConfig::new("127.0.0.1", self.port)
    }

    /// Stop accepting; the port is released once the task is cancelled.
    async fn stop(self) -> u16 {
        self.handle.abort();
        let _ = self.handle.await;
        self.port
    }
}

/// A loopback port with nothing listening on it.
async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn balancer_config(backends: Vec<BackendConfig>, interval: Duration) -> Config {
    let mut config = Config::default();
    config.listener.address = "127.0.0.1".parse().unwrap();
    config.listener.port = 0;
    config.backends = backends;
    config.health_check.interval = interval;
    config.health_check.timeout = Duration::from_millis(500);
    config.proxy.connect_timeout = Duration::from_secs(2);
    config.proxy.io_timeout = Some(Duration::from_secs(5));
    config
}

async fn send(addr: SocketAddr, payload: &[u8]) -> String {
    let result = timeout(Duration::from_secs(5), async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(payload).await?;
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    })
    .await
    .expect("request timed out")
    .expect("request failed");

    String::from_utf8(result).unwrap()
}

#[tokio::test]
async fn test_round_robin_hello_world() {
    let backends = [
        EchoBackend::start().await,
        EchoBackend::start().await,
        EchoBackend::start().await,
    ];
    let config = balancer_config(
        backends.iter().map(EchoBackend::config).collect(),
        Duration::from_secs(60),
    );

    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();

    let first = send(addr, b"hello").await;
    assert_eq!(first, format!("Echo from port: {}:hello", backends[0].port));

    let second = send(addr, b"world").await;
    assert_eq!(second, format!("Echo from port: {}:world", backends[1].port));

    let third = send(addr, b"again").await;
    assert_eq!(third, format!("Echo from port: {}:again", backends[2].port));

    let registry = lb.state().registry();
    assert!((0..3).all(|i| registry.request_count(i) == 1));

    lb.shutdown().await;
}

#[tokio::test]
async fn test_failover_past_unreachable_backend() {
    let b0 = EchoBackend::start().await;
    let down = dead_port().await;
    let b2 = EchoBackend::start().await;

    let config = balancer_config(
        vec![b0.config(), BackendConfig::new("127.0.0.1", down), b2.config()],
        Duration::from_secs(60),
    );
    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();

    assert!(send(addr, b"one").await.contains(&b0.port.to_string()));

    // Cursor is on backend 1, which is still flagged healthy but refuses.
    let reply = send(addr, b"two").await;
    assert_eq!(reply, format!("Echo from port: {}:two", b2.port));

    // The cursor moved past backend 1's slot exactly once.
    let reply = send(addr, b"three").await;
    assert_eq!(reply, format!("Echo from port: {}:three", b2.port));

    let registry = lb.state().registry();
    assert_eq!(registry.request_count(0), 1);
    assert_eq!(registry.request_count(1), 0);
    assert_eq!(registry.request_count(2), 2);

    lb.shutdown().await;
}

#[tokio::test]
async fn test_all_backends_down_returns_503() {
    let config = balancer_config(
        vec![
            BackendConfig::new("127.0.0.1", dead_port().await),
            BackendConfig::new("127.0.0.1", dead_port().await),
        ],
        Duration::from_secs(60),
    );
    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();

    // Still flagged healthy: every failover attempt fails.
    assert_eq!(send(addr, b"hello").await.as_bytes(), SERVICE_UNAVAILABLE);

    // Flagged unhealthy: no backend connect is attempted at all.
    lb.state().registry().set_health(0, false);
    lb.state().registry().set_health(1, false);
    assert_eq!(send(addr, b"hello").await.as_bytes(), SERVICE_UNAVAILABLE);

    lb.shutdown().await;
}

#[tokio::test]
async fn test_unhealthy_live_backends_are_not_contacted() {
    let backends = [EchoBackend::start().await, EchoBackend::start().await];
    let config = balancer_config(
        backends.iter().map(EchoBackend::config).collect(),
        Duration::from_secs(60),
    );
    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();

    lb.state().registry().set_health(0, false);
    lb.state().registry().set_health(1, false);

    for _ in 0..3 {
        assert_eq!(send(addr, b"hello").await.as_bytes(), SERVICE_UNAVAILABLE);
    }
    sleep(Duration::from_millis(100)).await;
    assert_eq!(backends[0].accepted(), 0);
    assert_eq!(backends[1].accepted(), 0);

    // Restoring one backend sends traffic to it again.
    lb.state().registry().set_health(0, true);
    let reply = send(addr, b"back").await;
    assert_eq!(reply, format!("Echo from port: {}:back", backends[0].port));
    assert_eq!(backends[0].accepted(), 1);
    assert_eq!(backends[1].accepted(), 0);

    lb.shutdown().await;
}

#[tokio::test]
async fn test_health_flips_both_ways() {
    let backend = EchoBackend::start().await;
    let interval = Duration::from_millis(100);
    let config = balancer_config(vec![backend.config()], interval);

    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();
    let registry = lb.state().registry().clone();

    // Backend stops: unhealthy within one interval plus one probe timeout.
    let port = backend.stop().await;
    let deadline = Instant::now() + Duration::from_secs(3);
    while registry.is_healthy(0) && Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!registry.is_healthy(0));
    assert_eq!(send(addr, b"ping").await.as_bytes(), SERVICE_UNAVAILABLE);

    // Backend comes back on the same port: healthy again.
    let _backend = EchoBackend::start_on(port).await;
    let deadline = Instant::now() + Duration::from_secs(3);
    while !registry.is_healthy(0) && Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert!(registry.is_healthy(0));
    assert_eq!(send(addr, b"ping").await, format!("Echo from port: {}:ping", port));

    lb.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_clients_counted_once_each() {
    let backends = [EchoBackend::start().await, EchoBackend::start().await];
    let config = balancer_config(
        backends.iter().map(EchoBackend::config).collect(),
        Duration::from_secs(60),
    );
    let lb = LoadBalancer::start(config).await.unwrap();
    let addr = lb.local_addr();

    let clients: Vec<_> = (0..20)
        .map(|i| tokio::spawn(async move { send(addr, format!("msg-{}", i).as_bytes()).await }))
        .collect();
    for client in clients {
        assert!(client.await.unwrap().starts_with("Echo from port: "));
    }

    let registry = lb.state().registry();
    assert_eq!(registry.request_count(0), 10);
    assert_eq!(registry.request_count(1), 10);

    lb.shutdown().await;
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = balancer_config(
        vec![BackendConfig::new("127.0.0.1", 9)],
        Duration::from_secs(60),
    );
    config.listener.port = taken.local_addr().unwrap().port();

    assert!(LoadBalancer::start(config).await.is_err());
}

#[test]
fn test_config_parsing() {
    use healthlb::config::load_config;
    use std::io::Write;
    use tempfile::NamedTempFile;

    let config_content = r#"
global:
  log_level: debug
  log_format: json

listener:
  port: 8081

health_check:
  interval: 1s
  timeout: 500ms

proxy:
  buffer_size: 2048

backends:
  - host: "127.0.0.1"
    port: 9001
  - host: "127.0.0.1"
    port: 9002
"#;

    let mut temp_file = NamedTempFile::new().expect("failed to create temp file");
    temp_file
        .write_all(config_content.as_bytes())
        .expect("failed to write config");

    let config = load_config(temp_file.path()).expect("failed to load config");

    assert_eq!(config.listener.port, 8081);
    assert_eq!(config.listener.address.to_string(), "0.0.0.0");
    assert_eq!(config.health_check.interval, Duration::from_secs(1));
    assert_eq!(config.health_check.timeout, Duration::from_millis(500));
    assert_eq!(config.proxy.buffer_size, 2048);
    assert_eq!(config.backends.len(), 2);
    assert_eq!(config.backends[1].port, 9002);
}

#[test]
fn test_config_validation_no_backends() {
    use healthlb::config::load_config;
    use std::io::Write;
    use tempfile::NamedTempFile;

    let mut temp_file = NamedTempFile::new().expect("failed to create temp file");
    temp_file
        .write_all(b"backends: []\n")
        .expect("failed to write config");

    assert!(load_config(temp_file.path()).is_err());
}
