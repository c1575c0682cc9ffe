//! The request interceptor — network first, cache fallback.
//!
//! [`Interceptor::handle`] is the whole decision:
//!
//! - non-GET requests pass through to the network untouched, with no cache
//!   involvement on either path;
//! - a GET is tried against the live network first, and a successful
//!   response is snapshotted into the current cache bucket;
//! - when the network fails, the request identity is looked up in the
//!   bucket — a hit serves the stored copy, a miss surfaces as a 504.
//!
//! The network itself is behind the [`Network`] trait so the decision can
//! be exercised without sockets; [`crate::upstream::UpstreamClient`] is the
//! real implementation.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{Bucket, StoredResponse};
use crate::http::{Request, Response, StatusCode, response::ResponseError};

/// Errors produced by a [`Network`] fetch. Any of these routes a GET into
/// the cache fallback path.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to connect to upstream {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during upstream exchange: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("bad upstream response: {0}")]
    BadResponse(#[from] ResponseError),
}

/// The network-fetch primitive: one request out, one response back.
pub trait Network: Send + Sync + 'static {
    /// Performs the live network call for `request`.
    fn fetch(&self, request: &Request)
    -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// Composes the network and the current cache bucket into one
/// request-handling decision.
pub struct Interceptor<N> {
    network: N,
    bucket: Bucket,
}

impl<N: Network> Interceptor<N> {
    /// Creates an interceptor over a network primitive and the current
    /// generation's bucket.
    pub fn new(network: N, bucket: Bucket) -> Self {
        Self { network, bucket }
    }

    /// Handles one request to completion. Never returns an error: every
    /// failure path maps to a response the client can observe.
    pub async fn handle(&self, request: Request) -> Response {
        if !request.method().is_cacheable() {
            return self.pass_through(request).await;
        }

        let identity = request.identity();
        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.status().is_success() {
                    self.bucket
                        .put(identity, StoredResponse::snapshot(&response))
                        .await;
                }
                response
            }
            Err(e) => {
                debug!(%identity, error = %e, "network fetch failed — consulting cache");
                match self.bucket.lookup(&identity).await {
                    Some(stored) => {
                        info!(%identity, "serving cached response");
                        stored.into_response()
                    }
                    None => {
                        // No retry: a fallback miss is a hard failure.
                        debug!(%identity, "no cached copy");
                        Response::new(StatusCode::GatewayTimeout)
                            .body("upstream unreachable and no cached copy exists")
                    }
                }
            }
        }
    }

    /// Relays a non-GET request without touching the cache.
    async fn pass_through(&self, request: Request) -> Response {
        let identity = request.identity();
        match self.network.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%identity, error = %e, "pass-through request failed");
                Response::new(StatusCode::BadGateway).body("upstream unreachable")
            }
        }
    }
}
