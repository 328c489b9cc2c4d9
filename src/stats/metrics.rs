//! Statistics for capture and ingest sessions

use std::time::{Duration, Instant};

/// Client-side transmit counters for one connection
#[derive(Debug, Clone)]
pub struct TransmitStats {
    /// Frames written to the transport
    pub frames_sent: u64,
    /// Payload bytes written to the transport
    pub bytes_sent: u64,
    /// Size of the most recent frame
    pub last_frame_size: usize,
    /// When counting started (connect time)
    pub started_at: Instant,
}

impl TransmitStats {
    /// Start counting now
    pub fn new() -> Self {
        Self {
            frames_sent: 0,
            bytes_sent: 0,
            last_frame_size: 0,
            started_at: Instant::now(),
        }
    }

    /// Account for one transmitted frame
    pub fn record(&mut self, size: usize) {
        self.frames_sent += 1;
        self.bytes_sent += size as u64;
        self.last_frame_size = size;
    }

    /// Average frames per second since `started_at`
    pub fn fps(&self) -> f64 {
        let secs = self.started_at.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether the frame counter just reached a multiple of `every`
    pub fn should_report(&self, every: u64) -> bool {
        every > 0 && self.frames_sent > 0 && self.frames_sent % every == 0
    }
}

impl Default for TransmitStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay-side counters for one ingest session
#[derive(Debug, Clone)]
pub struct IngestStats {
    /// Frames received from the producer
    pub frames_received: u64,
    /// Payload bytes received from the producer
    pub bytes_received: u64,
    /// Frames whose append to the recording failed
    pub persist_failures: u64,
    /// Viewers dropped by fan-out during this session
    pub subscribers_dropped: u64,
    /// Session start
    pub started_at: Instant,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            frames_received: 0,
            bytes_received: 0,
            persist_failures: 0,
            subscribers_dropped: 0,
            started_at: Instant::now(),
        }
    }

    /// Account for one received frame
    pub fn on_frame(&mut self, size: usize) {
        self.frames_received += 1;
        self.bytes_received += size as u64;
    }

    /// Session duration
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}
