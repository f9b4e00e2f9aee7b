//! Subscription system for live collection updates.
//!
//! Every subscriber receives the complete place collection:
//! - once, immediately, when it subscribes
//! - again after every create, replace or delete by any client
//!
//! There is no delta format. Buffers are bounded and a subscriber that
//! falls behind is dropped.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig::default())?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StoreEvent::Snapshot { places, revision }) => render(places),
//!         Ok(StoreEvent::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! handle.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId};
