//! Snapshot to render plan.
//!
//! Every snapshot is rendered from scratch: the previous marker set is
//! discarded and rebuilt, so a plan only ever reflects the newest snapshot.

use crate::types::{PlaceKey, PlaceRecord, Position};
use serde::Serialize;

/// One map marker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkerView {
    pub key: PlaceKey,
    pub position: Position,
    pub title: String,
    pub content: String,
    pub highlighted: bool,
}

/// What the detail panel shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetailPanel {
    /// Nothing selected; invite the user to pick a marker.
    Prompt,
    /// The collection is empty.
    NoRecords,
    /// A single place.
    Place { title: String, content: String },
}

/// Desired rendered state for one snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderPlan {
    /// Sorted by key.
    pub markers: Vec<MarkerView>,
    pub center: Option<Position>,
    pub most_recent: Option<PlaceKey>,
    pub detail: DetailPanel,
}

impl RenderPlan {
    pub fn highlighted(&self) -> impl Iterator<Item = &MarkerView> {
        self.markers.iter().filter(|m| m.highlighted)
    }

    pub fn contains(&self, key: &PlaceKey) -> bool {
        self.markers.iter().any(|m| &m.key == key)
    }
}

/// The record with the greatest `modified_at`; equal times go to the
/// smallest key.
pub fn most_recent(records: &[PlaceRecord]) -> Option<&PlaceRecord> {
    records.iter().max_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| b.key.cmp(&a.key))
    })
}

/// Stateful wrapper that knows whether anything has been rendered yet.
#[derive(Debug, Default)]
pub struct Reconciler {
    has_rendered_once: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_rendered_once(&self) -> bool {
        self.has_rendered_once
    }

    /// Build the render plan for `snapshot`.
    ///
    /// `explicit_center` (for example the place that was just saved) wins
    /// over centering on the most recent place. The first non-empty
    /// snapshot is rendered without a highlight.
    pub fn reconcile(
        &mut self,
        snapshot: &[PlaceRecord],
        explicit_center: Option<Position>,
    ) -> RenderPlan {
        let mut markers: Vec<MarkerView> = snapshot
            .iter()
            .map(|record| MarkerView {
                key: record.key.clone(),
                position: record.position,
                title: record.title.clone(),
                content: record.content.clone(),
                highlighted: false,
            })
            .collect();
        markers.sort_by(|a, b| a.key.cmp(&b.key));

        let latest = match most_recent(snapshot) {
            Some(record) => record,
            None => {
                return RenderPlan {
                    markers,
                    center: None,
                    most_recent: None,
                    detail: DetailPanel::NoRecords,
                }
            }
        };

        if self.has_rendered_once {
            for marker in markers.iter_mut() {
                marker.highlighted = marker.key == latest.key;
            }
        }
        self.has_rendered_once = true;

        RenderPlan {
            markers,
            center: Some(explicit_center.unwrap_or(latest.position)),
            most_recent: Some(latest.key.clone()),
            detail: DetailPanel::Prompt,
        }
    }
}
