//! Subscriber registry for viewer fan-out
//!
//! The registry holds the viewers attached to the relay and delivers each
//! frame from the active producer to all of them.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<SubscriberRegistry>
//!                  ┌───────────────────────────────┐
//!                  │ subscribers: Mutex<BTreeMap<  │
//!                  │   SubscriberId,               │
//!                  │   Box<dyn FrameWriter>,       │
//!                  │ >>                            │
//!                  └───────────────┬───────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [Ingest task]           [Viewer task]            [Viewer task]
//!    broadcast(payload)      add() / remove()         add() / remove()
//!         │
//!         └──► write_frame() per viewer ──► WebSocket
//! ```
//!
//! Payloads are `bytes::Bytes`, so every viewer shares one allocation per
//! frame.

pub mod config;
pub mod frame;
pub mod store;
pub mod writer;

pub use config::RegistryConfig;
pub use frame::{Frame, SubscriberId};
pub use store::{BroadcastOutcome, SubscriberRegistry, Subscription};
pub use writer::FrameWriter;
