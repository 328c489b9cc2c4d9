//! Client configuration

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Default relay address
pub const DEFAULT_ADDR: &str = "localhost:8080";

/// Default codec label
pub const DEFAULT_CODEC: &str = "h264";

/// Parameters of one capture session
///
/// Fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Target bit rate in bits per second
    pub bit_rate: u32,
    /// Capture device selector (empty = backend default)
    pub device_id: String,
    /// Codec label, informational
    pub codec_name: String,
    /// Relay ingest URL (`ws://host:port/ws`)
    pub streaming_url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::for_address(DEFAULT_ADDR)
    }
}

impl StreamConfig {
    /// Config streaming to the ingest endpoint of the relay at `addr`
    pub fn for_address(addr: &str) -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 30,
            bit_rate: 1_000_000,
            device_id: String::new(),
            codec_name: DEFAULT_CODEC.to_string(),
            streaming_url: format!("ws://{}/ws", addr),
        }
    }

    /// Set the frame size
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the frame rate
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Set the bit rate
    pub fn bit_rate(mut self, bps: u32) -> Self {
        self.bit_rate = bps;
        self
    }

    /// Set the capture device
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Check parameters and the streaming URL
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(Error::Config("frame rate must be positive".into()));
        }
        if self.bit_rate == 0 {
            return Err(Error::Config("bit rate must be positive".into()));
        }

        self.url().map(|_| ())
    }

    /// Parsed streaming URL
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.streaming_url)
            .map_err(|e| Error::Config(format!("invalid streaming URL {}: {}", self.streaming_url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::Config(format!(
                    "unsupported scheme {} in {}",
                    other, self.streaming_url
                )))
            }
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::Config(format!(
                "missing host in {}",
                self.streaming_url
            )));
        }

        Ok(url)
    }
}

/// Connection behaviour of the capture client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Wait between failed dial attempts
    pub retry_interval: Duration,

    /// Wait before redialing after a mid-stream disconnect
    pub reconnect_delay: Duration,

    /// Deadline for one dial attempt
    pub connect_timeout: Duration,

    /// How long `stop_capture` waits for the transmit task
    pub shutdown_timeout: Duration,

    /// Log transmit statistics every `report_interval` frames
    pub debug: bool,

    /// Frames between debug reports
    pub report_interval: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            debug: false,
            report_interval: 30,
        }
    }
}

impl ClientConfig {
    /// Set the dial retry interval
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the dial timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable debug statistics
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream_config() {
        let config = StreamConfig::default();

        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.bit_rate, 1_000_000);
        assert_eq!(config.codec_name, "h264");
        assert_eq!(config.streaming_url, "ws://localhost:8080/ws");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StreamConfig::for_address("10.0.0.5:9000")
            .resolution(1280, 720)
            .frame_rate(60)
            .bit_rate(4_000_000)
            .device("/dev/video2");

        assert_eq!(config.streaming_url, "ws://10.0.0.5:9000/ws");
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.device_id, "/dev/video2");
        assert_eq!(config.url().unwrap().port(), Some(9000));
    }

    #[test]
    fn test_invalid_parameters() {
        let config = StreamConfig::default().resolution(0, 480);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = StreamConfig::default().frame_rate(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = StreamConfig::default().bit_rate(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = StreamConfig::default();

        config.streaming_url = "http://localhost:8080/ws".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.streaming_url = "not a url".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.streaming_url = "wss://relay.example.com/ws".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .retry_interval(Duration::from_millis(200))
            .reconnect_delay(Duration::from_millis(50))
            .connect_timeout(Duration::from_secs(1))
            .debug(true);

        assert_eq!(config.retry_interval, Duration::from_millis(200));
        assert_eq!(config.reconnect_delay, Duration::from_millis(50));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert!(config.debug);
        assert_eq!(config.report_interval, 30);
    }
}
