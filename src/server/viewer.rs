//! Viewer connection handler
//!
//! A viewer only receives. The handler registers the write half with the
//! registry and reads the connection solely to notice when it goes away.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::{FrameWriter, SubscriberRegistry};

/// Registry-facing write half of a viewer WebSocket
pub struct WsFrameWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl WsFrameWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, payload: Bytes) -> Result<()> {
        self.sink.send(Message::Binary(payload)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

/// Serve one viewer until it disconnects, is dropped by the registry, or
/// the relay shuts down
pub async fn run_viewer(
    ws: WebSocket,
    session_id: u64,
    peer_addr: SocketAddr,
    registry: &SubscriberRegistry,
    shutdown: &CancellationToken,
) {
    let (sink, mut stream) = ws.split();
    let subscription = registry.add(Box::new(WsFrameWriter::new(sink))).await;

    tracing::info!(
        session_id = session_id,
        peer = %peer_addr,
        subscriber = %subscription.id,
        "Viewer connected"
    );

    let reason = loop {
        tokio::select! {
            _ = subscription.disconnected.cancelled() => break "dropped by relay",
            _ = shutdown.cancelled() => break "relay shutdown",
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => break "closed by viewer",
                Some(Ok(_)) => {
                    // Viewer payloads are ignored
                }
                Some(Err(e)) => {
                    tracing::debug!(session_id = session_id, error = %e, "Viewer read failed");
                    break "read error";
                }
            },
        }
    };

    registry.remove(subscription.id).await;

    tracing::info!(
        session_id = session_id,
        peer = %peer_addr,
        subscriber = %subscription.id,
        reason = reason,
        "Viewer disconnected"
    );
}
