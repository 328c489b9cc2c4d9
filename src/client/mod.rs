//! Capture client
//!
//! Reads frames from a capture source and pushes them to the relay's ingest
//! endpoint, reconnecting whenever the connection is lost:
//! - [`CaptureService`] owns the single active session (start/stop)
//! - [`Publisher`] runs the connection state machine for one session
//! - [`Connector`] and [`FrameSource`] are the seams to the network and the
//!   camera

pub mod config;
pub mod connector;
pub mod publisher;
pub mod service;
pub mod source;

pub use config::{ClientConfig, StreamConfig};
pub use connector::{Connector, FrameSink, WsConnector, WsSink};
pub use publisher::{LinkEvent, Publisher, SessionEnd};
pub use service::CaptureService;
pub use source::{CaptureBackend, DeviceBackend, DeviceInfo, FrameSource, ReaderSource};
