//! # Client Configuration
//!
//! Purpose: Turn user-facing settings into the immutable options every pooled
//! connection dials with.
//!
//! ## Design Principles
//! 1. **Clamp, Don't Reject**: Out-of-range timeouts and pool sizes are pulled
//!    into their supported range.
//! 2. **Resolve Once**: Endpoints are validated when the pool is built, so a bad
//!    address fails construction instead of the first command.
//! 3. **Serde-Friendly**: [`ClientConfig`] loads from JSON with every field
//!    optional.

use std::net::ToSocketAddrs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::resp::CodecConfig;

/// Shortest per-command deadline.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Longest per-command deadline.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);
/// Upper bound on pooled connections regardless of CPU count.
pub const MAX_CONNECTIONS_CAP: usize = 10;

/// Configuration for the connection pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP, e.g. "127.0.0.1".
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Unix domain socket; takes precedence over host/port when usable.
    pub socket_path: Option<PathBuf>,
    /// Per-command deadline in seconds, clamped to [1, 600].
    pub timeout_secs: u64,
    /// Pooled connections, clamped to [1, min(10, available parallelism)].
    pub max_connections: usize,
    /// Token sent with `AUTH` right after every dial.
    pub auth: Option<String>,
    /// Capacity of each connection's read buffer.
    pub read_buffer_size: usize,
    /// Reply decoding limits.
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            socket_path: None,
            timeout_secs: 0,
            max_connections: 1,
            auth: None,
            read_buffer_size: 4096,
            codec: CodecConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> ClientResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Where connections dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port` string, re-resolved on every dial.
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

/// Immutable options shared by every connection of a pool.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub endpoint: Endpoint,
    pub timeout: Duration,
    pub auth: Option<String>,
    pub read_buffer_size: usize,
    pub codec: CodecConfig,
}

impl ConnectionOptions {
    /// Validates the endpoint and clamps the timeout.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Ok(ConnectionOptions {
            endpoint: resolve_endpoint(config)?,
            timeout: clamp_timeout(config.timeout_secs),
            auth: config.auth.clone().filter(|token| !token.is_empty()),
            read_buffer_size: config.read_buffer_size.max(1),
            codec: config.codec,
        })
    }
}

/// Clamps a per-command timeout to `[MIN_TIMEOUT, MAX_TIMEOUT]`.
pub fn clamp_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs).clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

/// Clamps a requested pool size to `[1, min(10, available parallelism)]`.
pub fn clamp_max_connections(requested: usize) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    requested.clamp(1, MAX_CONNECTIONS_CAP.min(parallelism))
}

fn resolve_endpoint(config: &ClientConfig) -> ClientResult<Endpoint> {
    if let Some(path) = config
        .socket_path
        .as_ref()
        .filter(|path| !path.as_os_str().is_empty())
    {
        #[cfg(unix)]
        return Ok(Endpoint::Unix(path.clone()));

        #[cfg(not(unix))]
        tracing::warn!(path = %path.display(), "unix sockets unsupported here, using tcp");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let resolved = addr
        .to_socket_addrs()
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false);
    if !resolved {
        return Err(ClientError::InvalidAddress(addr));
    }
    Ok(Endpoint::Tcp(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_clamped() {
        assert_eq!(clamp_timeout(0), MIN_TIMEOUT);
        assert_eq!(clamp_timeout(3), Duration::from_secs(3));
        assert_eq!(clamp_timeout(10_000), MAX_TIMEOUT);
    }

    #[test]
    fn max_connections_is_clamped() {
        let ceiling = clamp_max_connections(usize::MAX);
        assert!((1..=MAX_CONNECTIONS_CAP).contains(&ceiling));
        assert_eq!(clamp_max_connections(0), 1);
        assert_eq!(clamp_max_connections(1), 1);
    }

    #[test]
    fn tcp_endpoint_joins_host_and_port() {
        let config = ClientConfig {
            port: 7000,
            ..ClientConfig::default()
        };
        let options = ConnectionOptions::from_config(&config).unwrap();
        assert_eq!(options.endpoint, Endpoint::Tcp("127.0.0.1:7000".to_string()));
        assert_eq!(options.timeout, MIN_TIMEOUT);
        assert!(options.auth.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn socket_path_takes_precedence() {
        let config = ClientConfig {
            socket_path: Some(PathBuf::from("/tmp/rkv.sock")),
            ..ClientConfig::default()
        };
        let options = ConnectionOptions::from_config(&config).unwrap();
        assert_eq!(options.endpoint, Endpoint::Unix(PathBuf::from("/tmp/rkv.sock")));
    }

    #[test]
    fn unresolvable_host_is_rejected() {
        let config = ClientConfig {
            host: "no such host".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            ConnectionOptions::from_config(&config),
            Err(ClientError::InvalidAddress(_))
        ));
    }

    #[test]
    fn empty_auth_is_ignored() {
        let config = ClientConfig {
            auth: Some(String::new()),
            ..ClientConfig::default()
        };
        let options = ConnectionOptions::from_config(&config).unwrap();
        assert!(options.auth.is_none());
    }

    #[test]
    fn loads_partial_json() {
        let config =
            ClientConfig::from_json(r#"{"port": 6380, "timeout_secs": 5, "codec": {"max_depth": 4}}"#)
                .unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.codec.max_depth, 4);
        assert_eq!(config.codec.max_bulk_len, CodecConfig::default().max_bulk_len);
    }
}
