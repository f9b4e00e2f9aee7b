//! Map session configuration.

use crate::error::{PlaceError, Result};
use crate::subscriptions::SubscriptionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for a map client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Zoom level before anything is selected.
    pub default_zoom: u8,

    /// Zoom level when a marker is clicked.
    pub focus_zoom: u8,

    /// Detail panel text when nothing is selected.
    pub prompt_text: String,

    /// Detail panel text when there are no places.
    pub empty_text: String,

    /// Addresses remembered by the geocoding cache.
    pub geocode_cache_size: usize,

    /// Subscription settings.
    pub subscription: SubscriptionConfig,

    /// Re-subscribe attempts after the live channel drops.
    pub resubscribe_attempts: u32,

    /// Pause between re-subscribe attempts, in milliseconds.
    pub resubscribe_backoff_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_zoom: 10,
            focus_zoom: 14,
            prompt_text: "Click a spot to see information.".to_string(),
            empty_text: "No places yet.".to_string(),
            geocode_cache_size: 256,
            subscription: SubscriptionConfig::default(),
            resubscribe_attempts: 5,
            resubscribe_backoff_ms: 200,
        }
    }
}

impl MapConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: MapConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.subscription.buffer_size == 0 {
            return Err(PlaceError::InvalidFormat(
                "subscription.buffer_size must be at least 1".into(),
            ));
        }
        if self.focus_zoom < self.default_zoom {
            return Err(PlaceError::InvalidFormat(format!(
                "focus_zoom {} is below default_zoom {}",
                self.focus_zoom, self.default_zoom
            )));
        }
        Ok(())
    }

    pub fn resubscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_backoff_ms)
    }
}
