//! Relay server
//!
//! One producer connects at the ingest path and any number of viewers at
//! the viewer path. Every frame from the producer is appended to a
//! recording file and written to every viewer.
//!
//! ```text
//!   producer ──► /ws ──► IngestSession ──┬──► RecordingFile (webcam_<time>.h264)
//!                                        │
//!                                        └──► SubscriberRegistry ──┬──► /view viewer
//!                                                                  └──► /view viewer
//! ```

pub mod config;
pub mod ingest;
pub mod listener;
pub mod recording;
pub mod status;
pub mod viewer;

pub use config::ServerConfig;
pub use ingest::IngestSession;
pub use listener::RelayServer;
pub use recording::RecordingFile;
