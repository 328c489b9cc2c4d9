//! camstream: live camera streaming over WebSocket
//!
//! Two halves share this crate:
//! - a capture client that reads encoded frames from a camera and pushes
//!   them to a relay, reconnecting whenever the link drops
//! - a relay that accepts one producer, fans every frame out to all
//!   connected viewers, and appends it to a per-session recording file
//!
//! ```text
//!   camera ──► CaptureService ──► Publisher ══ ws://host:8080/ws ══► RelayServer
//!                                                                     │
//!                                             webcam_<time>.h264 ◄────┤
//!                                                                     ├──► /view viewer
//!                                                                     └──► /view viewer
//! ```
//!
//! # Running a relay
//!
//! ```no_run
//! use camstream::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> camstream::Result<()> {
//!     let config = ServerConfig::with_addr("0.0.0.0:8080".parse().unwrap())
//!         .output_dir("recordings");
//!     RelayServer::new(config).run().await
//! }
//! ```
//!
//! # Streaming a camera
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camstream::client::{ClientConfig, DeviceBackend, WsConnector};
//! use camstream::{CaptureService, StreamConfig};
//!
//! # async fn example() -> camstream::Result<()> {
//! let service = CaptureService::new(
//!     Arc::new(DeviceBackend::new()),
//!     Arc::new(WsConnector::default()),
//!     ClientConfig::default(),
//! );
//!
//! let mut events = service
//!     .start_capture(StreamConfig::for_address("localhost:8080").device("/dev/video0"))
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{CaptureService, LinkEvent, Publisher, SessionEnd, StreamConfig};
pub use error::{Error, Result};
pub use registry::{Frame, SubscriberRegistry};
pub use server::{RelayServer, ServerConfig};
