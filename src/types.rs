//! Core types for place records.

use crate::error::{PlaceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A geographic point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    /// Create a position, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || lat.abs() > 90.0 {
            return Err(PlaceError::InvalidCoordinate {
                field: "lat",
                value: lat.to_string(),
            });
        }
        if !lng.is_finite() || lng.abs() > 180.0 {
            return Err(PlaceError::InvalidCoordinate {
                field: "lng",
                value: lng.to_string(),
            });
        }
        Ok(Self { lat, lng })
    }

    /// Parse a position from form text.
    pub fn parse(lat: &str, lng: &str) -> Result<Self> {
        let lat_value = lat.trim().parse::<f64>().map_err(|_| PlaceError::InvalidCoordinate {
            field: "lat",
            value: lat.to_string(),
        })?;
        let lng_value = lng.trim().parse::<f64>().map_err(|_| PlaceError::InvalidCoordinate {
            field: "lng",
            value: lng.to_string(),
        })?;
        Self::new(lat_value, lng_value)
    }
}

/// Canonical identity of a place, derived from its position as `"{lat}:{lng}"`.
///
/// There is no way to build a key from arbitrary text; it always comes from
/// a [`Position`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceKey(String);

impl PlaceKey {
    /// Derive the key for a position.
    pub fn from_position(position: &Position) -> Self {
        PlaceKey(format!(
            "{}:{}",
            format_coordinate(position.lat),
            format_coordinate(position.lng)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shortest round-trip text for a coordinate, with `-0` folded into `0`.
fn format_coordinate(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    value.to_string()
}

impl fmt::Debug for PlaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaceKey({})", self.0)
    }
}

impl fmt::Display for PlaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    /// The smallest timestamp strictly after `self`.
    pub fn successor(self) -> Self {
        Timestamp(self.0 + 1)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Number of mutations a store has applied.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rev({})", self.0)
    }
}

/// A single persisted place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    /// Derived from `position`; never set independently.
    pub key: PlaceKey,

    pub title: String,

    /// Free-form description.
    pub content: String,

    /// Geocoding input only. Not authoritative once `position` is known.
    pub address: Option<String>,

    pub position: Position,

    /// Stamped by the store on every write.
    pub modified_at: Timestamp,
}

impl PlaceRecord {
    /// Build a record whose key is derived from `position`.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        address: Option<String>,
        position: Position,
    ) -> Self {
        Self {
            key: PlaceKey::from_position(&position),
            title: title.into(),
            content: content.into(),
            address,
            position,
            modified_at: Timestamp::now(),
        }
    }

    /// Builder-style override of the modification time.
    pub fn with_modified_at(mut self, modified_at: Timestamp) -> Self {
        self.modified_at = modified_at;
        self
    }

    /// Check that the stored key still matches the position.
    pub fn verify_key(&self) -> Result<()> {
        let position = Position::new(self.position.lat, self.position.lng)?;
        let expected = PlaceKey::from_position(&position);
        if expected != self.key {
            return Err(PlaceError::InconsistentKey {
                expected,
                got: self.key.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = PlaceKey::from_position(&Position::new(37.5, -122.25).unwrap());
        assert_eq!(key.as_str(), "37.5:-122.25");

        let whole = PlaceKey::from_position(&Position::new(10.0, 20.0).unwrap());
        assert_eq!(whole.as_str(), "10:20");
    }

    #[test]
    fn test_negative_zero_folds() {
        let a = PlaceKey::from_position(&Position::new(-0.0, 0.0).unwrap());
        let b = PlaceKey::from_position(&Position::new(0.0, -0.0).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0:0");
    }

    #[test]
    fn test_position_bounds() {
        assert!(Position::new(90.0, 180.0).is_ok());
        assert!(Position::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            Position::new(90.5, 0.0),
            Err(PlaceError::InvalidCoordinate { field: "lat", .. })
        ));
        assert!(matches!(
            Position::new(0.0, 181.0),
            Err(PlaceError::InvalidCoordinate { field: "lng", .. })
        ));
        assert!(Position::new(f64::NAN, 0.0).is_err());
        assert!(Position::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_trims_and_rejects_garbage() {
        let pos = Position::parse(" 51.5 ", "-0.125").unwrap();
        assert_eq!(pos, Position { lat: 51.5, lng: -0.125 });

        assert!(matches!(
            Position::parse("north", "1"),
            Err(PlaceError::InvalidCoordinate { field: "lat", .. })
        ));
    }

    #[test]
    fn test_verify_key_detects_tampering() {
        let mut record = PlaceRecord::new("Cafe", "Good coffee", None, Position::new(1.0, 2.0).unwrap());
        assert!(record.verify_key().is_ok());

        record.position = Position::new(1.5, 2.0).unwrap();
        assert!(matches!(
            record.verify_key(),
            Err(PlaceError::InconsistentKey { .. })
        ));
    }

    #[test]
    fn test_timestamp_successor() {
        let t = Timestamp(41);
        assert_eq!(t.successor(), Timestamp(42));
        assert!(Timestamp::now() > Timestamp(0));
    }
}
