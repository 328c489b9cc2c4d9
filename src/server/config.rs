//! Server configuration

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::RegistryConfig;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default endpoint for the producer connection
pub const DEFAULT_INGEST_PATH: &str = "/ws";

/// Default endpoint for viewer connections
pub const DEFAULT_VIEWER_PATH: &str = "/view";

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Directory receiving one recording per ingest session
    pub output_dir: PathBuf,

    /// Request path of the producer endpoint
    pub ingest_path: String,

    /// Request path of the viewer endpoint
    pub viewer_path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Largest accepted WebSocket message (one frame)
    pub max_message_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Fan-out settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            output_dir: PathBuf::from("recordings"),
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
            viewer_path: DEFAULT_VIEWER_PATH.to_string(),
            max_connections: 0, // Unlimited
            max_message_size: 16 * 1024 * 1024, // 16MB
            tcp_nodelay: true,                  // Low latency for small frames
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the recordings directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-viewer write deadline
    pub fn subscriber_write_timeout(mut self, timeout: Duration) -> Self {
        self.registry.write_timeout = timeout;
        self
    }

    /// Set the largest accepted frame
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Check that the endpoints can be routed
    pub fn validate(&self) -> Result<()> {
        for path in [&self.ingest_path, &self.viewer_path] {
            if !path.starts_with('/') || path == "/" {
                return Err(Error::Config(format!(
                    "endpoint path {:?} must start with '/' and not be the status page",
                    path
                )));
            }
            // Router syntax, not literal paths
            if path.contains(['{', '}', '*', ':']) {
                return Err(Error::Config(format!(
                    "endpoint path {:?} contains route parameters",
                    path
                )));
            }
        }
        if self.ingest_path == self.viewer_path {
            return Err(Error::Config(format!(
                "ingest and viewer share the path {}",
                self.ingest_path
            )));
        }
        if self.max_message_size == 0 {
            return Err(Error::Config("max message size must be positive".into()));
        }
        Ok(())
    }
}
