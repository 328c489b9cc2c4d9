//! Single-producer ingest slot
//!
//! The relay records and broadcasts one producer at a time. An ingest
//! connection claims the slot before the upgrade and holds the guard for
//! its whole session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const FREE: u64 = 0;

/// Ownership marker for the one active producer
#[derive(Debug, Default)]
pub struct IngestSlot {
    holder: AtomicU64,
}

impl IngestSlot {
    /// Create a free slot
    pub fn new() -> Self {
        Self {
            holder: AtomicU64::new(FREE),
        }
    }

    /// Claim the slot for `session_id`
    ///
    /// Returns `None` while another session holds it. Session ids must be
    /// non-zero.
    pub fn try_acquire(self: &Arc<Self>, session_id: u64) -> Option<IngestGuard> {
        debug_assert_ne!(session_id, FREE);

        self.holder
            .compare_exchange(FREE, session_id, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| IngestGuard {
                slot: Arc::clone(self),
                session_id,
            })
    }

    /// Session currently holding the slot
    pub fn holder(&self) -> Option<u64> {
        match self.holder.load(Ordering::Acquire) {
            FREE => None,
            id => Some(id),
        }
    }

    /// Whether a producer is live
    pub fn is_taken(&self) -> bool {
        self.holder().is_some()
    }
}

/// Releases the ingest slot when dropped
#[derive(Debug)]
pub struct IngestGuard {
    slot: Arc<IngestSlot>,
    session_id: u64,
}

impl IngestGuard {
    /// Session owning this guard
    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl Drop for IngestGuard {
    fn drop(&mut self) {
        let _ = self.slot.holder.compare_exchange(
            self.session_id,
            FREE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
