//! Runs portico in front of an origin, with config from an optional JSON file.
//!
//! ```sh
//! cargo run --example offline_fallback            # defaults
//! cargo run --example offline_fallback -- portico.json
//! ```
//!
//! Start it in front of a local web app, load a few pages, stop the app, and
//! reload: GETs keep working from the cache while everything else fails as
//! it would without the proxy.

use portico::config::ProxyConfig;
use portico::proxy::Proxy;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::default(),
    };

    let proxy = Proxy::bind(config).await?;
    println!("Listening on http://{}", proxy.local_addr());
    proxy.run().await?;
    Ok(())
}
