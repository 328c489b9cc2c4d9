//! Capture-and-transmit pipeline
//!
//! Drives one frame source into one relay connection and re-establishes the
//! connection when it fails.
//!
//! ```text
//!            ┌──────────── retry_interval ───────────┐
//!            ▼                                       │ dial failed
//!     Disconnected ──► Dialing ──► Connected ──► Streaming
//!            ▲                                       │ write failed
//!            └─────────── reconnect_delay ───────────┘
//! ```
//!
//! Cancellation ends the machine from any state: no further dial is made and
//! no further frame is read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::ClientConfig;
use super::connector::{Connector, FrameSink};
use super::source::FrameSource;
use crate::error::Error;
use crate::session::{Link, LinkState};
use crate::stats::TransmitStats;

/// Capacity of the event channel
const EVENT_CAPACITY: usize = 256;

/// Events from the publisher
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Link entered a new state
    State(LinkState),

    /// Dial succeeded; `attempt` counts connects in this session, from 1
    Connected { attempt: u32 },

    /// Dial failed; the next attempt follows after the retry interval
    DialFailed { failures: u32, error: String },

    /// Established connection broke mid-stream
    TransportLost { error: String },

    /// The state machine has stopped
    Terminated(SessionEnd),
}

/// Why a capture session stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Cancellation was requested
    Cancelled,
    /// Frame source reported end of stream
    SourceExhausted,
    /// Frame source failed
    SourceFailed(String),
    /// Dial failed in a way another attempt cannot fix
    DialRejected(String),
}

/// How one dial loop ended
enum DialOutcome {
    Connected(Box<dyn FrameSink>),
    Cancelled,
    Rejected(Error),
}

/// How one streaming pass ended
enum StreamOutcome {
    Cancelled,
    SourceExhausted,
    SourceFailed(Error),
    TransportFailed(Error),
}

/// Publisher for one capture session
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
///
/// use camstream::client::{ClientConfig, Publisher, ReaderSource, WsConnector};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let source = ReaderSource::new("stdin", tokio::io::stdin(), 1024 * 1024);
/// let (publisher, mut events) = Publisher::new(
///     Arc::new(WsConnector::default()),
///     "ws://localhost:8080/ws",
///     ClientConfig::default(),
/// );
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let end = publisher.run(Box::new(source), CancellationToken::new()).await;
/// println!("session ended: {:?}", end);
/// # }
/// ```
pub struct Publisher {
    connector: Arc<dyn Connector>,
    url: String,
    config: ClientConfig,
    event_tx: mpsc::Sender<LinkEvent>,
    link: Link,
}

impl Publisher {
    /// Create a new publisher.
    ///
    /// Returns the publisher and a receiver for events.
    pub fn new(
        connector: Arc<dyn Connector>,
        url: impl Into<String>,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);

        let publisher = Self {
            connector,
            url: url.into(),
            config,
            event_tx: tx,
            link: Link::new(),
        };

        (publisher, rx)
    }

    /// Run the session to completion
    ///
    /// Closes the connection first and the source second, whatever the
    /// reason for stopping.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        cancel: CancellationToken,
    ) -> SessionEnd {
        tracing::info!(url = %self.url, source = %source.id(), "Capture session started");

        let end = loop {
            let mut sink = match self.connect(&cancel).await {
                DialOutcome::Connected(sink) => sink,
                DialOutcome::Cancelled => break SessionEnd::Cancelled,
                DialOutcome::Rejected(e) => break SessionEnd::DialRejected(e.to_string()),
            };

            self.set_state(LinkState::Streaming);
            let outcome = self.stream(sink.as_mut(), source.as_mut(), &cancel).await;

            let end = match outcome {
                StreamOutcome::TransportFailed(e) => {
                    tracing::warn!(
                        error = %e,
                        uptime_secs = self.link.uptime().map_or(0, |d| d.as_secs()),
                        "Connection to relay lost"
                    );
                    drop(sink);
                    self.set_state(LinkState::Disconnected);
                    self.emit(LinkEvent::TransportLost {
                        error: e.to_string(),
                    });

                    if !self.pause(&cancel, self.config.reconnect_delay).await {
                        break SessionEnd::Cancelled;
                    }
                    continue;
                }
                StreamOutcome::Cancelled => SessionEnd::Cancelled,
                StreamOutcome::SourceExhausted => SessionEnd::SourceExhausted,
                StreamOutcome::SourceFailed(e) => SessionEnd::SourceFailed(e.to_string()),
            };

            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "Close handshake failed");
            }
            self.set_state(LinkState::Disconnected);
            break end;
        };

        if let Err(e) = source.close().await {
            tracing::error!(source = %source.id(), error = %e, "Failed to close frame source");
        }

        tracing::info!(reason = ?end, connects = self.link.connects, "Capture session ended");
        self.emit(LinkEvent::Terminated(end.clone()));
        end
    }

    /// Dial until connected
    ///
    /// Retryable failures wait `retry_interval` and dial again; any other
    /// failure ends the loop. No dial starts after cancellation.
    async fn connect(&mut self, cancel: &CancellationToken) -> DialOutcome {
        loop {
            if cancel.is_cancelled() {
                return DialOutcome::Cancelled;
            }

            self.set_state(LinkState::Dialing);

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(LinkState::Disconnected);
                    return DialOutcome::Cancelled;
                }
                attempt = self.connector.dial(&self.url) => attempt,
            };

            match attempt {
                Ok(sink) => {
                    self.set_state(LinkState::Connected);
                    self.emit(LinkEvent::Connected {
                        attempt: self.link.connects,
                    });
                    tracing::info!(url = %self.url, "Connected to relay");
                    return DialOutcome::Connected(sink);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(url = %self.url, error = %e, "Relay cannot be dialed");
                    self.set_state(LinkState::Disconnected);
                    return DialOutcome::Rejected(e);
                }
                Err(e) => {
                    self.link.on_dial_failed();
                    self.emit(LinkEvent::State(LinkState::Disconnected));
                    self.emit(LinkEvent::DialFailed {
                        failures: self.link.failed_dials,
                        error: e.to_string(),
                    });
                    tracing::warn!(
                        error = %e,
                        failures = self.link.failed_dials,
                        retry_secs = self.config.retry_interval.as_secs_f64(),
                        "Failed to connect to relay, retrying"
                    );

                    if !self.pause(cancel, self.config.retry_interval).await {
                        return DialOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Transmit frames until the source ends, the transport fails, or
    /// cancellation is requested
    async fn stream(
        &mut self,
        sink: &mut dyn FrameSink,
        source: &mut dyn FrameSource,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut stats = TransmitStats::new();

        tracing::info!("Streaming video");

        loop {
            // Checked before every read so shutdown waits at most one read
            if cancel.is_cancelled() {
                return StreamOutcome::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                next = source.read_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return StreamOutcome::SourceExhausted,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read frame");
                    return StreamOutcome::SourceFailed(e);
                }
            };

            if frame.is_empty() {
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                sent = sink.send(&frame) => sent,
            };

            if let Err(e) = sent {
                return StreamOutcome::TransportFailed(e);
            }

            stats.record(frame.byte_length());

            if self.config.debug && stats.should_report(self.config.report_interval) {
                tracing::debug!(
                    frames = stats.frames_sent,
                    fps = %format!("{:.2}", stats.fps()),
                    last_frame_bytes = stats.last_frame_size,
                    "Transmit statistics"
                );
            }
        }
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn pause(&self, cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn set_state(&mut self, next: LinkState) {
        if self.link.state == next {
            return;
        }

        match next {
            LinkState::Dialing => self.link.start_dial(),
            LinkState::Connected => self.link.on_connected(),
            LinkState::Streaming => self.link.start_streaming(),
            LinkState::Disconnected => self.link.on_disconnected(),
        }
        self.emit(LinkEvent::State(next));
    }

    fn emit(&self, event: LinkEvent) {
        // Never block the transmit path on a slow event consumer
        let _ = self.event_tx.try_send(event);
    }
}
