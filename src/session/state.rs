//! Connection lifecycle state machine
//!
//! Tracks the client's outbound link through dial, retry, streaming and
//! teardown.
//!
//! ```text
//!   Disconnected ──► Dialing ──► Connected ──► Streaming
//!        ▲              │            │             │
//!        └──────────────┴────────────┴─────────────┘
//!          dial failure / write error / cancellation
//! ```

use std::time::{Duration, Instant};

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection; the next step is a dial attempt or termination
    Disconnected,
    /// Dial in progress
    Dialing,
    /// Transport established, transmit loop not yet running
    Connected,
    /// Transmit loop running
    Streaming,
}

impl LinkState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;

        matches!(
            (self, next),
            (Disconnected, Dialing)
                | (Dialing, Connected)
                | (Dialing, Disconnected)
                | (Connected, Streaming)
                | (Connected, Disconnected)
                | (Streaming, Disconnected)
        )
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Dialing => "dialing",
            LinkState::Connected => "connected",
            LinkState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Complete link state with counters
#[derive(Debug)]
pub struct Link {
    /// Current state
    pub state: LinkState,

    /// Dial attempts since the last successful connect
    pub failed_dials: u32,

    /// Successful connects over the session lifetime
    pub connects: u32,

    /// When the current connection was established
    pub connected_at: Option<Instant>,
}

impl Link {
    /// Create a link in `Disconnected`
    pub fn new() -> Self {
        Self {
            state: LinkState::Disconnected,
            failed_dials: 0,
            connects: 0,
            connected_at: None,
        }
    }

    /// Begin a dial attempt
    pub fn start_dial(&mut self) {
        self.transition(LinkState::Dialing);
    }

    /// Record a failed dial
    pub fn on_dial_failed(&mut self) {
        self.failed_dials += 1;
        self.transition(LinkState::Disconnected);
    }

    /// Record a successful dial
    pub fn on_connected(&mut self) {
        self.failed_dials = 0;
        self.connects += 1;
        self.connected_at = Some(Instant::now());
        self.transition(LinkState::Connected);
    }

    /// Enter the transmit loop
    pub fn start_streaming(&mut self) {
        self.transition(LinkState::Streaming);
    }

    /// Drop the current connection
    pub fn on_disconnected(&mut self) {
        self.connected_at = None;
        self.transition(LinkState::Disconnected);
    }

    /// Time spent on the current connection
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    fn transition(&mut self, next: LinkState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal link transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(from = %self.state, to = %next, "Link state change");
        self.state = next;
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}
