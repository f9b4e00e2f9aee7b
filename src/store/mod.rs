//! The backing document store and its adapter contract.

mod documents;
mod journal;

pub use documents::{DocumentStore, StoreConfig};
pub use journal::{Journal, JournalEntry};

use crate::error::Result;
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle};
use crate::types::{PlaceKey, PlaceRecord};

/// Contract every place store satisfies.
///
/// Keys are document identifiers: there is at most one record per key.
/// `put` and `remove` are idempotent. Subscribers see the complete
/// collection after every mutation, from any client.
pub trait PlaceStore: Send + Sync {
    /// One-shot fetch of every record.
    fn read_all(&self) -> Result<Vec<PlaceRecord>>;

    /// Register for full-collection pushes. The current collection is
    /// delivered first.
    fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle>;

    /// Create or replace the record at `key`.
    fn put(&self, key: &PlaceKey, record: PlaceRecord) -> Result<()>;

    /// Delete the record at `key`. Absent keys are not an error.
    fn remove(&self, key: &PlaceKey) -> Result<()>;
}
