//! Subscription types for live collection updates.

use crate::types::{PlaceRecord, Revision};
use serde::{Deserialize, Serialize};
use std::sync::Weak;

use super::manager::SubscriptionManager;

/// Configuration for a subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Max buffered snapshots before dropping the subscriber.
    /// Default: 64
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The complete collection as of `revision`, in no particular order.
    Snapshot {
        places: Vec<PlaceRecord>,
        revision: Revision,
    },

    /// Subscription was dropped; no further snapshots will follow.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The store shut down.
    StoreClosed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a live subscription.
///
/// Releasing the handle, by [`unsubscribe`](Self::unsubscribe) or by
/// dropping it, deregisters it from the store exactly once.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
    pub(crate) registry: Weak<SubscriptionManager>,
    pub(crate) released: bool,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Stop delivery and release the channel.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(manager) = self.registry.upgrade() {
            manager.unsubscribe(self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
