//! Turning edit intents into store writes.
//!
//! A place's key is its position, so an edit that moves a place changes its
//! identity. The resolver writes the record under the new key first and only
//! then deletes the old key: observers may briefly see both, never neither.

use crate::error::{PlaceError, Result};
use crate::geocode::Geocoder;
use crate::store::PlaceStore;
use crate::types::{PlaceKey, PlaceRecord, Position};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Validated key for a raw coordinate pair.
pub fn derive_key(lat: f64, lng: f64) -> Result<PlaceKey> {
    Ok(PlaceKey::from_position(&Position::new(lat, lng)?))
}

/// The edit form's fields, as typed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceForm {
    pub title: String,
    pub content: String,
    pub address: String,
    pub lat: String,
    pub lng: String,
    /// Save as a new place instead of replacing the selected one.
    pub add_new: bool,
}

impl PlaceForm {
    /// Form contents for editing an existing place.
    pub fn from_record(record: &PlaceRecord) -> Self {
        Self {
            title: record.title.clone(),
            content: record.content.clone(),
            address: record.address.clone().unwrap_or_default(),
            lat: record.position.lat.to_string(),
            lng: record.position.lng.to_string(),
            add_new: false,
        }
    }
}

/// A record left behind when the second half of a move failed.
#[derive(Clone, Debug, PartialEq)]
pub struct OrphanedRecord {
    pub key: PlaceKey,
    pub reason: String,
}

/// Result of a successful edit.
#[derive(Clone, Debug, PartialEq)]
pub struct EditOutcome {
    /// Identity of the saved place; the new selection.
    pub key: PlaceKey,
    pub position: Position,
    /// Coordinates came from the address rather than the form.
    pub geocoded: bool,
    /// Old key that was deleted by a move.
    pub moved_from: Option<PlaceKey>,
    /// Old key whose delete failed; the record now exists twice.
    pub orphan: Option<OrphanedRecord>,
}

/// Applies edits against a store.
pub struct IdentityResolver {
    store: Arc<dyn PlaceStore>,
    geocoder: Arc<dyn Geocoder>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn PlaceStore>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { store, geocoder }
    }

    /// Validate `form`, write it under its derived key and, for a move,
    /// delete `prior_key` afterwards.
    ///
    /// Validation failures return before anything is written.
    pub fn apply_edit(&self, form: &PlaceForm, prior_key: Option<&PlaceKey>) -> Result<EditOutcome> {
        let title = form.title.trim();
        if title.is_empty() {
            return Err(PlaceError::MissingField("title"));
        }
        let content = form.content.trim();
        if content.is_empty() {
            return Err(PlaceError::MissingField("content"));
        }

        let (position, geocoded) = self.resolve_position(form)?;
        let address = Some(form.address.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        let record = PlaceRecord::new(title, content, address, position);
        let key = record.key.clone();

        self.store.put(&key, record)?;
        debug!(key = %key, geocoded, "saved place");

        let mut outcome = EditOutcome {
            key: key.clone(),
            position,
            geocoded,
            moved_from: None,
            orphan: None,
        };

        let prior = match prior_key {
            Some(prior) if !form.add_new && *prior != key => prior,
            _ => return Ok(outcome),
        };

        match self.store.remove(prior) {
            Ok(()) => {
                debug!(from = %prior, to = %key, "moved place");
                outcome.moved_from = Some(prior.clone());
            }
            Err(e) => {
                warn!(from = %prior, to = %key, error = %e, "move left the old place behind");
                outcome.orphan = Some(OrphanedRecord {
                    key: prior.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(outcome)
    }

    /// Coordinates from the form, or from the address when either is blank.
    pub fn resolve_position(&self, form: &PlaceForm) -> Result<(Position, bool)> {
        let (lat, lng) = (form.lat.trim(), form.lng.trim());
        if !lat.is_empty() && !lng.is_empty() {
            return Ok((Position::parse(lat, lng)?, false));
        }

        let address = form.address.trim();
        if address.is_empty() {
            return Err(PlaceError::MissingLocation);
        }

        let position = self
            .geocoder
            .resolve(address)
            .map_err(|source| PlaceError::UnresolvableAddress {
                address: address.to_string(),
                source,
            })?;
        Ok((position, true))
    }
}
