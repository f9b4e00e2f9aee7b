//! Address lookup and device location.
//!
//! Both are best-effort collaborators: any failure is reported to the user
//! and treated as "no result". Nothing here retries on its own.

mod cache;
mod google;

pub use cache::CachedGeocoder;
pub use google::{GoogleGeocoder, HttpTransport, GEOCODE_ENDPOINT};

use crate::types::Position;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a lookup produced no coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("no result")]
    NoResult,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied")]
    PermissionDenied,
}

/// Translates free-text addresses into coordinates.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, address: &str) -> Result<Position, GatewayError>;
}

impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    fn resolve(&self, address: &str) -> Result<Position, GatewayError> {
        (**self).resolve(address)
    }
}

/// One-shot device position lookup.
pub trait DeviceLocator: Send + Sync {
    fn current_position(&self) -> Result<Position, GatewayError>;
}

/// Geocoder backed by a fixed address table.
///
/// Lookups ignore surrounding whitespace and ASCII case.
#[derive(Clone, Debug, Default)]
pub struct StaticGeocoder {
    entries: HashMap<String, Position>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address.
    pub fn with(mut self, address: &str, position: Position) -> Self {
        self.entries.insert(normalize(address), position);
        self
    }
}

impl Geocoder for StaticGeocoder {
    fn resolve(&self, address: &str) -> Result<Position, GatewayError> {
        self.entries
            .get(&normalize(address))
            .copied()
            .ok_or(GatewayError::NoResult)
    }
}

/// Locator that always reports the same outcome.
#[derive(Clone, Debug)]
pub struct FixedLocator(pub Result<Position, GatewayError>);

impl DeviceLocator for FixedLocator {
    fn current_position(&self) -> Result<Position, GatewayError> {
        self.0.clone()
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_geocoder_lookup() {
        let harbor = Position::new(44.5, -68.25).unwrap();
        let geocoder = StaticGeocoder::new().with("1 Harbor Rd", harbor);

        assert_eq!(geocoder.resolve("  1 harbor rd ").unwrap(), harbor);
        assert_eq!(geocoder.resolve("2 Harbor Rd"), Err(GatewayError::NoResult));
    }

    #[test]
    fn test_fixed_locator() {
        let denied = FixedLocator(Err(GatewayError::PermissionDenied));
        assert_eq!(denied.current_position(), Err(GatewayError::PermissionDenied));
    }
}
