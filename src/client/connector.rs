//! Outbound transport
//!
//! Frames travel as one binary WebSocket message each, with no header: the
//! message boundary is the frame boundary.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::registry::Frame;

/// Established connection to the relay's ingest endpoint
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame as one message
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to the relay
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial `url`
    ///
    /// Failures worth retrying are `Error::Dial`; a URL that can never
    /// connect is `Error::Config`.
    async fn dial(&self, url: &str) -> Result<Box<dyn FrameSink>>;
}

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn dial(&self, url: &str) -> Result<Box<dyn FrameSink>> {
        tracing::debug!(url = %url, "Dialing relay");

        match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
            .await
        {
            Ok(Ok((ws, _response))) => Ok(Box::new(WsSink { ws })),
            Ok(Err(tungstenite::Error::Url(e))) => {
                Err(Error::Config(format!("invalid relay URL {}: {}", url, e)))
            }
            Ok(Err(e)) => Err(Error::Dial(format!("{}: {}", url, e))),
            Err(_) => Err(Error::Dial(format!(
                "{}: timed out after {:?}",
                url, self.connect_timeout
            ))),
        }
    }
}

/// WebSocket connection carrying frames
pub struct WsSink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.ws.send(Message::Binary(frame.payload.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let close = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        };

        match self.ws.close(Some(close)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
