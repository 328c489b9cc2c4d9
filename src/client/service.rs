//! Capture session management
//!
//! At most one capture session runs per service. Starting a session while
//! one is active tears the old one down first, under the same lock, so two
//! transmit loops never overlap.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{ClientConfig, StreamConfig};
use super::connector::Connector;
use super::publisher::{LinkEvent, Publisher};
use super::source::{CaptureBackend, DeviceInfo};
use crate::error::{Error, Result};

/// The running session
struct ActiveSession {
    source_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: Instant,
}

/// Starts and stops capture sessions
pub struct CaptureService {
    backend: Arc<dyn CaptureBackend>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    session: Mutex<Option<ActiveSession>>,
}

impl CaptureService {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        connector: Arc<dyn Connector>,
        config: ClientConfig,
    ) -> Self {
        Self {
            backend,
            connector,
            config,
            session: Mutex::new(None),
        }
    }

    /// Devices the backend can capture from
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.backend.list_devices().map_err(|e| {
            tracing::error!(error = %e, "Failed to list devices");
            e
        })
    }

    /// Start capturing and streaming with `stream`
    ///
    /// Returns as soon as the source is open and the transmit task is
    /// spawned; connection problems surface only as events and logs. On a
    /// device error no session is left active.
    pub async fn start_capture(&self, stream: StreamConfig) -> Result<mpsc::Receiver<LinkEvent>> {
        stream.validate()?;

        let mut session = self.session.lock().await;

        if let Some(previous) = session.take() {
            tracing::info!(source = %previous.source_id, "Stopping previous capture session");
            self.teardown(previous).await;
        }

        let source = self.backend.open(&stream).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open capture source");
            e
        })?;
        let source_id = source.id().to_string();

        let cancel = CancellationToken::new();
        let (publisher, events) = Publisher::new(
            Arc::clone(&self.connector),
            stream.streaming_url.clone(),
            self.config.clone(),
        );

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let end = publisher.run(source, cancel).await;
                tracing::debug!(reason = ?end, "Transmit task finished");
            }
        });

        tracing::info!(source = %source_id, url = %stream.streaming_url, "Capture started");

        *session = Some(ActiveSession {
            source_id,
            cancel,
            handle,
            started_at: Instant::now(),
        });

        Ok(events)
    }

    /// Stop the active session
    ///
    /// Cancels the transmit task and waits for it to close the connection
    /// and the source. Fails with [`Error::NoActiveSession`] when nothing is
    /// running.
    pub async fn stop_capture(&self) -> Result<()> {
        let active = self
            .session
            .lock()
            .await
            .take()
            .ok_or(Error::NoActiveSession)?;

        tracing::info!(
            source = %active.source_id,
            duration_secs = active.started_at.elapsed().as_secs(),
            "Stopping capture"
        );
        self.teardown(active).await;
        Ok(())
    }

    /// Whether a session is active
    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn teardown(&self, mut active: ActiveSession) {
        active.cancel.cancel();

        match tokio::time::timeout(self.config.shutdown_timeout, &mut active.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(source = %active.source_id, error = %e, "Transmit task failed")
            }
            Err(_) => {
                tracing::warn!(
                    source = %active.source_id,
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Transmit task did not stop in time, aborting"
                );
                active.handle.abort();
            }
        }
    }
}
