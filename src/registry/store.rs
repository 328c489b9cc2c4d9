//! Subscriber registry implementation
//!
//! The set of viewer connections that receive every frame the active
//! producer sends. It is the only state on the relay mutated by more than
//! one task, and its mutex is the only mutual-exclusion point there.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::config::RegistryConfig;
use super::frame::SubscriberId;
use super::writer::FrameWriter;

/// A registered viewer
struct Subscriber {
    writer: Box<dyn FrameWriter>,
    /// Cancelled when the registry drops this viewer
    disconnect: CancellationToken,
}

/// Handle returned to the connection task that registered a viewer
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Registry key of the viewer
    pub id: SubscriberId,
    /// Fires when the registry removes the viewer (failed write or close)
    pub disconnected: CancellationToken,
}

/// Result of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Viewers that accepted the frame
    pub delivered: usize,
    /// Viewers removed because their write failed or timed out
    pub removed: usize,
}

/// Concurrency-safe set of viewer connections
///
/// Membership is keyed by [`SubscriberId`]. A viewer whose write fails is
/// removed in the same locked section as the failed attempt, so a member of
/// the set is always writable or about to be removed.
pub struct SubscriberRegistry {
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    config: RegistryConfig,
}

impl SubscriberRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a viewer
    pub async fn add(&self, writer: Box<dyn FrameWriter>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let disconnect = CancellationToken::new();

        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(
            id,
            Subscriber {
                writer,
                disconnect: disconnect.clone(),
            },
        );

        tracing::info!(
            subscriber = %id,
            subscribers = subscribers.len(),
            "Subscriber added"
        );

        Subscription {
            id,
            disconnected: disconnect,
        }
    }

    /// Deregister a viewer
    ///
    /// Returns false if the viewer was already gone (removed by a failed
    /// write or by [`close`](Self::close)).
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;

        match subscribers.remove(&id) {
            Some(subscriber) => {
                subscriber.disconnect.cancel();
                tracing::debug!(
                    subscriber = %id,
                    subscribers = subscribers.len(),
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Write a payload to every registered viewer
    ///
    /// The lock is held for the whole pass; each write is bounded by
    /// `write_timeout`. Viewers that fail are dropped after the pass and the
    /// rest still receive the frame.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastOutcome {
        let mut subscribers = self.subscribers.lock().await;
        let mut outcome = BroadcastOutcome::default();
        let mut failed = Vec::new();

        for (id, subscriber) in subscribers.iter_mut() {
            let write = subscriber.writer.write_frame(payload.clone());

            match tokio::time::timeout(self.config.write_timeout, write).await {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    tracing::debug!(subscriber = %id, error = %e, "Subscriber write failed");
                    failed.push(*id);
                }
                Err(_) => {
                    tracing::warn!(
                        subscriber = %id,
                        timeout_ms = self.config.write_timeout.as_millis() as u64,
                        "Subscriber write timed out"
                    );
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            if let Some(subscriber) = subscribers.remove(&id) {
                subscriber.disconnect.cancel();
                outcome.removed += 1;
            }
        }

        if outcome.removed > 0 {
            tracing::info!(
                removed = outcome.removed,
                subscribers = subscribers.len(),
                "Dropped failed subscribers"
            );
        }

        outcome
    }

    /// Force-disconnect and forget every viewer
    ///
    /// Returns the number of viewers that were disconnected.
    pub async fn close(&self) -> usize {
        let drained = std::mem::take(&mut *self.subscribers.lock().await);
        let count = drained.len();

        for (id, mut subscriber) in drained {
            subscriber.disconnect.cancel();

            match tokio::time::timeout(self.config.close_timeout, subscriber.writer.close()).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(subscriber = %id, error = %e, "Subscriber close failed")
                }
                Err(_) => tracing::debug!(subscriber = %id, "Subscriber close timed out"),
            }
        }

        if count > 0 {
            tracing::info!(disconnected = count, "All subscribers disconnected");
        }

        count
    }

    /// Number of registered viewers
    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Whether no viewer is registered
    pub async fn is_empty(&self) -> bool {
        self.subscribers.lock().await.is_empty()
    }

    /// Whether a viewer is still registered
    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().await.contains_key(&id)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
