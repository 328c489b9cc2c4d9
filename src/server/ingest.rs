//! Producer (ingest) connection handler
//!
//! Every binary message from the producer is one frame. Each frame is first
//! appended to the session's recording, then fanned out to the viewers. The
//! two steps fail independently: a failed append does not skip the fan-out
//! and a dropped viewer does not skip the append.

use std::net::SocketAddr;
use std::path::Path;

use axum::extract::ws::{Message, WebSocket};
use tokio_util::sync::CancellationToken;

use crate::registry::SubscriberRegistry;
use crate::server::recording::RecordingFile;
use crate::session::IngestGuard;
use crate::stats::IngestStats;

/// Why an ingest session ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum IngestEnd {
    /// Producer sent a close frame or the socket reached EOF
    Closed,
    /// Read failed mid-stream
    Failed(String),
    /// Relay is shutting down
    Shutdown,
}

/// Per-connection ingest state
pub struct IngestSession<'a> {
    /// Connection session ID
    pub session_id: u64,
    /// Remote peer address
    pub peer_addr: SocketAddr,
    /// Where the recording is created
    pub output_dir: &'a Path,
    /// Viewers receiving the frames
    pub registry: &'a SubscriberRegistry,
    /// Relay-wide shutdown signal
    pub shutdown: &'a CancellationToken,
    /// Claim on the single producer slot, released when the session ends
    pub guard: IngestGuard,
}

impl IngestSession<'_> {
    /// Drive the session until the producer goes away
    ///
    /// Everything the session learned (end reason, counters) is logged here.
    pub async fn run(self, mut ws: WebSocket) {
        let session_id = self.session_id;
        let mut stats = IngestStats::new();

        tracing::info!(
            session_id = session_id,
            peer = %self.peer_addr,
            "Producer connected"
        );

        let recording = match RecordingFile::create(self.output_dir).await {
            Ok(recording) => Some(recording),
            Err(e) => {
                tracing::error!(
                    session_id = session_id,
                    error = %e,
                    "Recording unavailable, relaying without persistence"
                );
                None
            }
        };

        let end = loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = ws.send(Message::Close(None)).await;
                    break IngestEnd::Shutdown;
                }
                message = ws.recv() => message,
            };

            match message {
                Some(Ok(Message::Binary(payload))) => {
                    stats.on_frame(payload.len());

                    if let Some(ref recording) = recording {
                        if let Err(e) = recording.write(&payload).await {
                            stats.persist_failures += 1;
                            // Log the first failure loudly, the rest quietly
                            if stats.persist_failures == 1 {
                                tracing::error!(session_id = session_id, error = %e, "Recording write failed");
                            } else {
                                tracing::debug!(session_id = session_id, error = %e, "Recording write failed");
                            }
                        }
                    }

                    let outcome = self.registry.broadcast(payload).await;
                    stats.subscribers_dropped += outcome.removed as u64;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(session_id = session_id, close = ?frame, "Producer closed");
                    break IngestEnd::Closed;
                }
                Some(Ok(_)) => {
                    // Text and control messages carry no frames
                }
                Some(Err(e)) => break IngestEnd::Failed(e.to_string()),
                None => break IngestEnd::Closed,
            }
        };

        if let Some(recording) = recording {
            if let Err(e) = recording.close().await {
                tracing::error!(session_id = session_id, error = %e, "Failed to close recording");
            }
        }

        // No frames arrive after the producer leaves
        let disconnected = self.registry.close().await;

        tracing::info!(
            session_id = session_id,
            peer = %self.peer_addr,
            reason = ?end,
            frames = stats.frames_received,
            bytes = stats.bytes_received,
            bitrate = stats.bitrate(),
            persist_failures = stats.persist_failures,
            viewers_disconnected = disconnected,
            duration_secs = stats.duration().as_secs(),
            "Producer disconnected"
        );

        drop(self.guard);
    }
}
