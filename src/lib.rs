//! # Place Map
//!
//! Live, shared place records on a map, where a place's position is also its
//! identity.
//!
//! ## Core Concepts
//!
//! - **Places**: Records keyed by `"{lat}:{lng}"`, one per position
//! - **Store**: Keyed documents pushed as full snapshots to every subscriber
//! - **Moves**: Editing a position writes the new key, then deletes the old one
//! - **Reconciliation**: Each snapshot rebuilds the marker set and highlights
//!   the most recently modified place
//! - **Sessions**: One subscription per client, re-established when dropped
//!
//! ## Example
//!
//! ```ignore
//! use placemap::{DocumentStore, InteractionController, LiveSession, MapConfig, UiEvent};
//!
//! let store = Arc::new(DocumentStore::open_or_create(StoreConfig {
//!     path: "./places".into(),
//!     ..Default::default()
//! })?);
//!
//! let controller = InteractionController::new(store.clone(), geocoder, locator, MapConfig::default());
//! let mut session = LiveSession::start(store, controller)?;
//!
//! session.handle_ui(UiEvent::MapClicked(Position::new(52.52, 13.405)?));
//! for command in session.pump()? {
//!     ui.apply(command);
//! }
//! session.shutdown();
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod geocode;
pub mod identity;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::MapConfig;
pub use controller::{InteractionController, Selection, UiCommand, UiEvent};
pub use error::{PlaceError, Result};
pub use geocode::{
    CachedGeocoder, DeviceLocator, FixedLocator, GatewayError, Geocoder, GoogleGeocoder,
    HttpTransport, StaticGeocoder,
};
pub use identity::{derive_key, EditOutcome, IdentityResolver, OrphanedRecord, PlaceForm};
pub use reconcile::{most_recent, DetailPanel, MarkerView, Reconciler, RenderPlan};
pub use session::LiveSession;
pub use store::{DocumentStore, PlaceStore, StoreConfig};
pub use subscriptions::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
