//! Single-shot request/response forwarding.
//!
//! One bounded read from the client, one write to the backend, one bounded read
//! from the backend, one write back. Nothing loops: a request or response larger
//! than the buffer is truncated to the buffer size.

use crate::backend::BackendEndpoint;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Bytes moved by one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeResult {
    /// Bytes sent from client to backend.
    pub bytes_to_backend: u64,
    /// Bytes sent from backend to client.
    pub bytes_to_client: u64,
}

/// The four I/O steps of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStep {
    ClientRead,
    BackendWrite,
    BackendRead,
    ClientWrite,
}

impl fmt::Display for ExchangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeStep::ClientRead => "client read",
            ExchangeStep::BackendWrite => "backend write",
            ExchangeStep::BackendRead => "backend read",
            ExchangeStep::ClientWrite => "client write",
        };
        f.write_str(name)
    }
}

/// Proxy error.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to connect to backend {0}: {1}")]
    BackendConnect(BackendEndpoint, io::Error),

    #[error("connection timeout to backend {0}")]
    BackendTimeout(BackendEndpoint),

    #[error("{step} timed out after {timeout:?}")]
    StepTimeout { step: ExchangeStep, timeout: Duration },

    #[error("{step} failed: {source}")]
    Io {
        step: ExchangeStep,
        #[source]
        source: io::Error,
    },
}

/// Connect to a backend with a timeout.
pub async fn connect_to_backend(
    endpoint: &BackendEndpoint,
    connect_timeout: Duration,
) -> Result<TcpStream, ProxyError> {
    debug!(backend = %endpoint, "connecting to backend");

    match timeout(
        connect_timeout,
        TcpStream::connect((endpoint.host(), endpoint.port())),
    )
    .await
    {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(backend = %endpoint, error = %e, "failed to set TCP_NODELAY on backend connection");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(ProxyError::BackendConnect(endpoint.clone(), e)),
        Err(_) => Err(ProxyError::BackendTimeout(endpoint.clone())),
    }
}

/// Forward exactly one request and one response.
///
/// Reads at most `buffer_size` bytes from the client. If the client sent
/// nothing, the backend is never written to and the result is all zeros.
/// Otherwise the bytes go to the backend verbatim, and at most `buffer_size`
/// bytes of its reply come back verbatim; an empty reply forwards nothing.
/// Each step is bounded by `io_timeout` when set.
pub async fn exchange_once<C, B>(
    client: &mut C,
    backend: &mut B,
    buffer_size: usize,
    io_timeout: Option<Duration>,
) -> Result<ExchangeResult, ProxyError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut result = ExchangeResult::default();

    let request_len = bounded(ExchangeStep::ClientRead, io_timeout, client.read(&mut buf)).await?;
    if request_len == 0 {
        debug!("client sent no data, skipping backend exchange");
        return Ok(result);
    }

    bounded(
        ExchangeStep::BackendWrite,
        io_timeout,
        backend.write_all(&buf[..request_len]),
    )
    .await?;
    result.bytes_to_backend = request_len as u64;

    let response_len = bounded(ExchangeStep::BackendRead, io_timeout, backend.read(&mut buf)).await?;
    if response_len > 0 {
        bounded(
            ExchangeStep::ClientWrite,
            io_timeout,
            client.write_all(&buf[..response_len]),
        )
        .await?;
        result.bytes_to_client = response_len as u64;
    }

    Ok(result)
}

/// Await one I/O step, applying the optional timeout.
async fn bounded<T, F>(
    step: ExchangeStep,
    io_timeout: Option<Duration>,
    fut: F,
) -> Result<T, ProxyError>
where
    F: Future<Output = io::Result<T>>,
{
    let outcome = match io_timeout {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| ProxyError::StepTimeout {
                step,
                timeout: limit,
            })?,
        None => fut.await,
    };

    outcome.map_err(|source| ProxyError::Io { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_connect_to_backend_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let endpoint = BackendEndpoint::new("127.0.0.1", port);
        let result = connect_to_backend(&endpoint, Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_backend_timeout() {
        // Non-routable address
        let endpoint = BackendEndpoint::new("10.255.255.1", 12345);

        let result = connect_to_backend(&endpoint, Duration::from_millis(100)).await;
        match result {
            Err(ProxyError::BackendTimeout(_)) | Err(ProxyError::BackendConnect(_, _)) => {}
            other => panic!("expected connect failure, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_to_backend_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = BackendEndpoint::new("127.0.0.1", port);
        let result = connect_to_backend(&endpoint, Duration::from_secs(5)).await;
        match result {
            Err(ProxyError::BackendConnect(_, _)) => {}
            other => panic!("expected connect error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_forwards_request_and_response() {
        let (mut client, mut client_peer) = duplex(64);
        let (mut backend, mut backend_peer) = duplex(64);

        client_peer.write_all(b"hello").await.unwrap();

        let backend_task = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let n = backend_peer.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"hello");
            backend_peer.write_all(b"echo:hello").await.unwrap();
        });

        let result = exchange_once(&mut client, &mut backend, 1024, None)
            .await
            .unwrap();
        backend_task.await.unwrap();

        assert_eq!(result.bytes_to_backend, 5);
        assert_eq!(result.bytes_to_client, 10);

        let mut reply = [0u8; 16];
        let n = client_peer.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"echo:hello");
    }

    #[tokio::test]
    async fn test_exchange_skips_backend_when_client_silent() {
        let (mut client, client_peer) = duplex(64);
        let (mut backend, mut backend_peer) = duplex(64);

        // Client closes without sending anything.
        drop(client_peer);

        let result = exchange_once(&mut client, &mut backend, 1024, None)
            .await
            .unwrap();
        assert_eq!(result, ExchangeResult::default());

        drop(backend);
        let mut buf = [0u8; 8];
        assert_eq!(backend_peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exchange_truncates_to_buffer_size() {
        let (mut client, mut client_peer) = duplex(64);
        let (mut backend, mut backend_peer) = duplex(64);

        client_peer.write_all(b"abcdefgh").await.unwrap();

        let backend_task = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let n = backend_peer.read(&mut buf).await.unwrap();
            backend_peer.write_all(b"0123456789").await.unwrap();
            buf[..n].to_vec()
        });

        let result = exchange_once(&mut client, &mut backend, 4, None)
            .await
            .unwrap();
        let forwarded = backend_task.await.unwrap();

        assert_eq!(forwarded, b"abcd");
        assert_eq!(result.bytes_to_backend, 4);
        assert_eq!(result.bytes_to_client, 4);

        let mut reply = [0u8; 16];
        let n = client_peer.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"0123");
    }

    #[tokio::test]
    async fn test_exchange_empty_backend_response() {
        let (mut client, mut client_peer) = duplex(64);
        let (mut backend, backend_peer) = duplex(64);

        client_peer.write_all(b"ping").await.unwrap();

        let backend_task = tokio::spawn(async move {
            let mut peer = backend_peer;
            let mut buf = [0u8; 16];
            let _ = peer.read(&mut buf).await.unwrap();
            // Close without replying.
        });

        let result = exchange_once(&mut client, &mut backend, 1024, None)
            .await
            .unwrap();
        backend_task.await.unwrap();

        assert_eq!(result.bytes_to_backend, 4);
        assert_eq!(result.bytes_to_client, 0);
    }

    #[tokio::test]
    async fn test_exchange_io_timeout() {
        let (mut client, _client_peer) = duplex(64);
        let (mut backend, _backend_peer) = duplex(64);

        let result = exchange_once(
            &mut client,
            &mut backend,
            1024,
            Some(Duration::from_millis(50)),
        )
        .await;

        match result {
            Err(ProxyError::StepTimeout { step, .. }) => {
                assert_eq!(step, ExchangeStep::ClientRead);
            }
            other => panic!("expected step timeout, got: {:?}", other),
        }
    }
}
