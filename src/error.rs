//! Error types for place storage and editing.

use crate::geocode::GatewayError;
use crate::types::PlaceKey;
use thiserror::Error;

/// Main error type for place operations.
#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {value}")]
    InvalidCoordinate { field: &'static str, value: String },

    #[error("No coordinates and no address to look them up from")]
    MissingLocation,

    #[error("Could not resolve address {address:?}: {source}")]
    UnresolvableAddress {
        address: String,
        #[source]
        source: GatewayError,
    },

    #[error("Record key {got} does not match its position (expected {expected})")]
    InconsistentKey { expected: PlaceKey, got: PlaceKey },

    #[error("NO PLACE SELECTED")]
    NoSelection,

    #[error("Subscription lost: {0}")]
    SubscriptionLost(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl PlaceError {
    /// True for errors caused by user input rather than by the system.
    ///
    /// These never reach the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlaceError::MissingField(_)
                | PlaceError::InvalidCoordinate { .. }
                | PlaceError::MissingLocation
                | PlaceError::UnresolvableAddress { .. }
        )
    }
}

impl From<serde_json::Error> for PlaceError {
    fn from(e: serde_json::Error) -> Self {
        PlaceError::Deserialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for PlaceError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        PlaceError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for PlaceError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        PlaceError::Deserialization(e.to_string())
    }
}

/// Result type for place operations.
pub type Result<T> = std::result::Result<T, PlaceError>;
