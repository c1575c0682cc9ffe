//! Async TCP front end using Tokio.
//!
//! Binds a listener, runs the worker lifecycle (install, then activation —
//! awaited to completion before any traffic is served), and dispatches each
//! parsed client request to the [`Interceptor`]. Supports HTTP/1.1
//! persistent connections (keep-alive) out of the box.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::cache::CacheStorage;
use crate::config::ProxyConfig;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::intercept::{Interceptor, Network};
use crate::upstream::UpstreamClient;
use crate::worker::Worker;

/// Errors produced by the proxy front end.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The portico proxy.
///
/// # Examples
///
/// ```rust,no_run
/// use portico::config::ProxyConfig;
/// use portico::proxy::Proxy;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let proxy = Proxy::bind(ProxyConfig::default()).await?;
///     println!("Listening on http://{}", proxy.local_addr());
///     proxy.run().await?;
///     Ok(())
/// }
/// ```
pub struct Proxy {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ProxyConfig,
    storage: CacheStorage,
}

impl Proxy {
    /// Binds the proxy to its configured listen address with fresh storage.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(config: ProxyConfig) -> Result<Self, ProxyError> {
        Self::bind_with_storage(config, CacheStorage::new()).await
    }

    /// Binds the proxy over existing storage. This is how a new generation
    /// takes over buckets left behind by a previous one.
    pub async fn bind_with_storage(
        config: ProxyConfig,
        storage: CacheStorage,
    ) -> Result<Self, ProxyError> {
        let listener =
            TcpListener::bind(&config.listen_addr)
                .await
                .map_err(|e| ProxyError::Bind {
                    addr: config.listen_addr.clone(),
                    source: e,
                })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
            storage,
        })
    }

    /// Returns the local address the proxy is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the lifecycle and then accepts connections until the process is
    /// terminated or an unrecoverable listener error occurs.
    ///
    /// Install and activation run first; no request is served until stale
    /// cache generations are gone. Each accepted connection is handled on
    /// its own Tokio task.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Io`] if the TCP listener itself fails.
    pub async fn run(self) -> Result<(), ProxyError> {
        let mut worker = Worker::new(self.storage.clone(), &self.config.cache_version);
        worker.install();
        worker.activate().await;

        let bucket = self.storage.open(&self.config.cache_version).await;
        let client = UpstreamClient::new(&self.config.upstream_addr)
            .timeout(self.config.upstream_timeout());
        let interceptor = Arc::new(Interceptor::new(client, bucket));

        info!(
            address = %self.local_addr,
            upstream = %self.config.upstream_addr,
            "portico listening"
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let interceptor = Arc::clone(&interceptor);
            let max_request_bytes = self.config.max_request_bytes;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, peer_addr, interceptor, max_request_bytes).await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single client connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<N: Network>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    interceptor: Arc<Interceptor<N>>,
    max_request_bytes: usize,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > max_request_bytes {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            target = %request.target(),
            "dispatching request"
        );

        let response = interceptor.handle(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}
