//! Frame and subscriber identity types
//!
//! A frame is one opaque unit of encoded video. It is never inspected: the
//! relay persists and forwards the payload verbatim.

use bytes::Bytes;

/// One opaque unit of encoded video payload
///
/// Cheap to clone: the payload is reference counted, so fan-out to many
/// viewers shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the producing source, starting at 1
    pub sequence: u64,
    /// Encoded bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// Payload size in bytes
    pub fn byte_length(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Identity of a registered viewer connection
///
/// Ids are allocated in increasing order, so ordering by id is join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}
