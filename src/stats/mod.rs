//! Statistics and metrics

pub mod metrics;

pub use metrics::{IngestStats, TransmitStats};
