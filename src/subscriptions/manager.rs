//! Subscription manager for broadcasting collection snapshots.

use crate::types::{PlaceRecord, Revision};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Internal subscription state.
struct Subscription {
    sender: Sender<StoreEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: StoreEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages subscriptions and broadcasts snapshots.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription primed with `initial`.
    ///
    /// The initial snapshot is queued before the handle is returned, so the
    /// first `recv` always yields the collection as of subscription time.
    /// Callers must hold whatever lock orders this against broadcasts.
    pub fn subscribe(
        self: &Arc<Self>,
        config: SubscriptionConfig,
        initial: Vec<PlaceRecord>,
        revision: Revision,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        let subscription = Subscription { sender };
        // Fresh channel with capacity >= 1, cannot be full.
        subscription.try_send(StoreEvent::Snapshot {
            places: initial,
            revision,
        });

        self.subscriptions.write().insert(id, subscription);
        debug!(subscription = id.0, ?revision, "subscribed");

        SubscriptionHandle {
            id,
            receiver,
            registry: Arc::downgrade(self),
            released: false,
        }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(StoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
            debug!(subscription = id.0, "unsubscribed");
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Push the full collection to every subscriber. Drops subscribers that fail to receive.
    pub fn broadcast_snapshot(&self, places: &[PlaceRecord], revision: Revision) {
        let event = StoreEvent::Snapshot {
            places: places.to_vec(),
            revision,
        };

        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, ?revision, "dropping slow subscriber");
                    // Might fail when the buffer is still full; the
                    // receiver then sees a disconnect instead.
                    let _ = sub.sender.try_send(StoreEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }

    /// Drop every subscriber, telling each one why.
    pub fn close_all(&self, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(StoreEvent::Dropped {
                reason: reason.clone(),
            });
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Timestamp};
    use std::time::Duration;

    fn make_place(lat: f64, modified: i64) -> PlaceRecord {
        PlaceRecord::new("t", "c", None, Position::new(lat, 0.0).unwrap())
            .with_modified_at(Timestamp(modified))
    }

    fn expect_snapshot(handle: &SubscriptionHandle) -> (Vec<PlaceRecord>, Revision) {
        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            StoreEvent::Snapshot { places, revision } => (places, revision),
            other => panic!("Expected Snapshot event, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = Arc::new(SubscriptionManager::new());

        let handle = manager.subscribe(SubscriptionConfig::default(), vec![], Revision(0));
        assert_eq!(manager.subscription_count(), 1);

        handle.unsubscribe();
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let manager = Arc::new(SubscriptionManager::new());
        {
            let _handle = manager.subscribe(SubscriptionConfig::default(), vec![], Revision(0));
            assert_eq!(manager.subscription_count(), 1);
        }
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_initial_snapshot_delivered_immediately() {
        let manager = Arc::new(SubscriptionManager::new());
        let handle = manager.subscribe(
            SubscriptionConfig::default(),
            vec![make_place(1.0, 5)],
            Revision(3),
        );

        let (places, revision) = expect_snapshot(&handle);
        assert_eq!(places.len(), 1);
        assert_eq!(revision, Revision(3));
    }

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let manager = Arc::new(SubscriptionManager::new());
        let a = manager.subscribe(SubscriptionConfig::default(), vec![], Revision(0));
        let b = manager.subscribe(SubscriptionConfig::default(), vec![], Revision(0));
        expect_snapshot(&a);
        expect_snapshot(&b);

        manager.broadcast_snapshot(&[make_place(1.0, 1), make_place(2.0, 2)], Revision(1));

        assert_eq!(expect_snapshot(&a).0.len(), 2);
        assert_eq!(expect_snapshot(&b).0.len(), 2);
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = Arc::new(SubscriptionManager::new());
        let config = SubscriptionConfig { buffer_size: 2 };
        let handle = manager.subscribe(config, vec![], Revision(0));

        // Flood without draining
        for i in 1..10 {
            manager.broadcast_snapshot(&[make_place(1.0, i)], Revision(i as u64));
        }

        assert_eq!(manager.subscription_count(), 0);

        // Buffer drains, then the channel reports disconnect
        let mut saw_disconnect = false;
        for _ in 0..5 {
            if handle.try_recv().is_err() {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
    }

    #[test]
    fn test_close_all_notifies() {
        let manager = Arc::new(SubscriptionManager::new());
        let handle = manager.subscribe(SubscriptionConfig::default(), vec![], Revision(0));
        expect_snapshot(&handle);

        manager.close_all(DropReason::StoreClosed);
        assert_eq!(manager.subscription_count(), 0);

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            StoreEvent::Dropped { reason } => assert_eq!(reason, DropReason::StoreClosed),
            other => panic!("Expected Dropped event, got {:?}", other),
        }
    }
}
