//! # portico
//!
//! An async HTTP/1.1 proxy that tries the live network first and falls back
//! to a previously cached response when the upstream is unreachable.
//!
//! Only GET responses are cached; everything else passes through untouched.
//! Cached responses live in a named bucket identified by a version label,
//! and activation deletes every bucket from superseded generations before
//! any traffic is served.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portico::config::ProxyConfig;
//! use portico::proxy::Proxy;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig {
//!         upstream_addr: "127.0.0.1:5000".to_owned(),
//!         ..ProxyConfig::default()
//!     };
//!     let proxy = Proxy::bind(config).await?;
//!     println!("Listening on http://{}", proxy.local_addr());
//!     proxy.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod intercept;
pub mod proxy;
pub mod upstream;
pub mod worker;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{Bucket, CacheStorage, StoredResponse};
pub use config::ProxyConfig;
pub use http::{Headers, Method, Request, RequestIdentity, Response, StatusCode};
pub use intercept::{FetchError, Interceptor, Network};
pub use proxy::{Proxy, ProxyError};
pub use upstream::UpstreamClient;
pub use worker::{Phase, Worker};
