//! Error types
//!
//! One variant per failure class of the relay and the capture client. The
//! variant decides the recovery policy: `Dial` is retried, `Transport` ends
//! one connection, `Persistence` is logged and skipped, `Device` and `Config`
//! are returned to the caller.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Capture source unavailable or misconfigured
    #[error("device error: {0}")]
    Device(String),

    /// Outbound connection could not be established
    #[error("dial error: {0}")]
    Dial(String),

    /// Read or write failure on an established connection
    #[error("transport error: {0}")]
    Transport(String),

    /// Recording file could not be created or written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid address or stream parameters
    #[error("config error: {0}")]
    Config(String),

    /// `stop_capture` called without a running session
    #[error("no active session")]
    NoActiveSession,

    /// Other I/O failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<axum::Error> for Error {
    fn from(err: axum::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl Error {
    /// Whether the client should dial again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Dial(_) | Error::Transport(_))
    }
}
