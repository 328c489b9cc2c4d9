//! Registry configuration

use std::time::Duration;

/// Subscriber registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Deadline for one frame write to one viewer
    ///
    /// Fan-out holds the registry lock, so this bounds how long a stalled
    /// viewer can delay everyone else.
    pub write_timeout: Duration,

    /// Deadline for sending the close handshake on force-disconnect
    pub close_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl RegistryConfig {
    /// Set the per-viewer write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the close handshake deadline
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
