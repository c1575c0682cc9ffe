//! Proxy configuration, loaded from a JSON file or built from defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for a [`crate::proxy::Proxy`].
///
/// Every field has a default, so a config file only needs the fields it
/// wants to override:
///
/// ```
/// use portico::config::ProxyConfig;
///
/// let config: ProxyConfig =
///     serde_json::from_str(r#"{"cache_version": "portal-cache-v2"}"#).unwrap();
/// assert_eq!(config.cache_version, "portal-cache-v2");
/// assert_eq!(config.listen_addr, "127.0.0.1:8080");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub listen_addr: String,

    /// Address of the upstream origin.
    pub upstream_addr: String,

    /// Version label naming the current cache bucket generation. Bump this
    /// to invalidate everything cached by previous generations; activation
    /// deletes their buckets.
    pub cache_version: String,

    /// Deadline for one complete upstream exchange, in milliseconds.
    pub upstream_timeout_ms: u64,

    /// Maximum size of a buffered client request, in bytes.
    pub max_request_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
            upstream_addr: "127.0.0.1:5000".to_owned(),
            cache_version: "portal-cache-v1".to_owned(),
            upstream_timeout_ms: 10_000,
            max_request_bytes: 8 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid JSON for this shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the upstream exchange deadline as a [`Duration`].
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.upstream_addr, "127.0.0.1:5000");
        assert_eq!(config.cache_version, "portal-cache-v1");
        assert_eq!(config.upstream_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{"upstream_addr": "10.0.0.7:80", "upstream_timeout_ms": 250}"#,
        )
        .unwrap();
        assert_eq!(config.upstream_addr, "10.0.0.7:80");
        assert_eq!(config.upstream_timeout(), Duration::from_millis(250));
        assert_eq!(config.cache_version, "portal-cache-v1");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = serde_json::from_str::<ProxyConfig>(r#"{"cache_verison": "typo"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ProxyConfig::load("/does/not/exist/portico.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
