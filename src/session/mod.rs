//! Connection session state
//!
//! Lifecycle tracking for the client's outbound link and the relay's
//! single-producer slot.

pub mod slot;
pub mod state;

pub use slot::{IngestGuard, IngestSlot};
pub use state::{Link, LinkState};
