//! The live network primitive — a minimal HTTP/1.1 client over TCP.
//!
//! One connection per exchange: the request is written with
//! `Connection: close`, the response is read to EOF under a deadline and
//! parsed with [`httparse`]. Every failure mode (connect refused, deadline
//! expiry, oversized or malformed response) surfaces as a
//! [`FetchError`], which is what routes a GET into the cache fallback.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::http::{Method, Request, Response};
use crate::intercept::{FetchError, Network};

/// Upper bound on a buffered upstream response (64 MiB).
const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// Default deadline for a complete upstream exchange.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP/1.1 client for a single upstream origin.
///
/// # Examples
///
/// ```rust,no_run
/// use portico::upstream::UpstreamClient;
/// use std::time::Duration;
///
/// let client = UpstreamClient::new("127.0.0.1:5000")
///     .timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    addr: String,
    timeout: Duration,
    max_response_bytes: usize,
}

impl UpstreamClient {
    /// Creates a client for the given upstream address with default limits.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: MAX_RESPONSE_SIZE,
        }
    }

    /// Sets the deadline for one complete exchange (connect, write, read).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum buffered response size.
    #[must_use]
    pub fn max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    /// Returns the upstream address this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn exchange(&self, request: &Request) -> Result<Response, FetchError> {
        let mut stream =
            TcpStream::connect(&self.addr)
                .await
                .map_err(|source| FetchError::Connect {
                    addr: self.addr.clone(),
                    source,
                })?;

        stream.write_all(&request.to_wire()).await?;
        stream.flush().await?;

        // Connection: close was sent, so EOF delimits the response.
        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                break;
            }
            if buf.len() > self.max_response_bytes {
                return Err(FetchError::ResponseTooLarge {
                    max_bytes: self.max_response_bytes,
                });
            }
        }

        debug!(addr = %self.addr, bytes = buf.len(), "upstream exchange complete");
        let response = if matches!(request.method(), Method::Head) {
            Response::parse_head(&buf)?
        } else {
            Response::parse(&buf)?
        };
        Ok(response)
    }
}

impl Network for UpstreamClient {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}
