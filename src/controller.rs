//! User gesture routing and selection tracking.
//!
//! The UI is a stream of [`UiEvent`]s in and [`UiCommand`]s out. Each event
//! kind has one handler; handlers talk to the store, geocoder and locator and
//! return the commands the UI should apply.

use crate::config::MapConfig;
use crate::error::PlaceError;
use crate::geocode::{CachedGeocoder, DeviceLocator, Geocoder};
use crate::identity::{IdentityResolver, PlaceForm};
use crate::reconcile::{DetailPanel, Reconciler, RenderPlan};
use crate::store::PlaceStore;
use crate::types::{PlaceKey, PlaceRecord, Position};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which place, if any, the edit panel is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Idle,
    Editing(PlaceKey),
    /// Filling in a new place after a map click. `prior` is what was
    /// selected before, so clearing the new-place flag turns the save into
    /// a move.
    Creating { prior: Option<PlaceKey> },
}

impl Selection {
    pub fn key(&self) -> Option<&PlaceKey> {
        match self {
            Selection::Idle => None,
            Selection::Editing(key) => Some(key),
            Selection::Creating { prior } => prior.as_ref(),
        }
    }
}

/// Input from the UI or the live subscription.
#[derive(Clone, Debug)]
pub enum UiEvent {
    MapClicked(Position),
    MarkerClicked(PlaceKey),
    Submitted(PlaceForm),
    RemoveRequested,
    LocateRequested,
    /// Fill coordinates from the typed address without saving.
    AddressLookup(String),
    SnapshotReceived(Vec<PlaceRecord>),
}

/// Output for the UI to apply, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum UiCommand {
    Render(RenderPlan),
    ShowDetail(DetailPanel),
    FillForm(PlaceForm),
    /// Clear the address, fill the coordinates and tick the new-place flag.
    BeginCreate(Position),
    FillCoordinates(Position),
    /// Highlight this marker and un-highlight the rest.
    HighlightOnly(PlaceKey),
    SetCenter(Position),
    SetZoom(u8),
    Alert(String),
}

/// The per-client controller.
pub struct InteractionController {
    store: Arc<dyn PlaceStore>,
    geocoder: Arc<dyn Geocoder>,
    locator: Arc<dyn DeviceLocator>,
    resolver: IdentityResolver,
    reconciler: Reconciler,
    selection: Selection,
    /// Last snapshot received.
    places: Vec<PlaceRecord>,
    /// Center for the next render, set by a save.
    pending_center: Option<Position>,
    config: MapConfig,
}

impl InteractionController {
    pub fn new(
        store: Arc<dyn PlaceStore>,
        geocoder: Arc<dyn Geocoder>,
        locator: Arc<dyn DeviceLocator>,
        config: MapConfig,
    ) -> Self {
        let geocoder: Arc<dyn Geocoder> = if config.geocode_cache_size > 0 {
            Arc::new(CachedGeocoder::new(geocoder, config.geocode_cache_size))
        } else {
            geocoder
        };

        Self {
            resolver: IdentityResolver::new(store.clone(), geocoder.clone()),
            store,
            geocoder,
            locator,
            reconciler: Reconciler::new(),
            selection: Selection::Idle,
            places: Vec::new(),
            pending_center: None,
            config,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Places from the most recent snapshot.
    pub fn places(&self) -> &[PlaceRecord] {
        &self.places
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Commands to apply before the first snapshot arrives.
    pub fn startup_commands(&self) -> Vec<UiCommand> {
        vec![
            UiCommand::SetZoom(self.config.default_zoom),
            UiCommand::ShowDetail(DetailPanel::Prompt),
        ]
    }

    /// Text for a detail panel.
    pub fn detail_text(&self, panel: &DetailPanel) -> String {
        match panel {
            DetailPanel::Prompt => self.config.prompt_text.clone(),
            DetailPanel::NoRecords => self.config.empty_text.clone(),
            DetailPanel::Place { title, content } => format!("{}\n\n{}", title, content),
        }
    }

    /// Route one event to its handler.
    pub fn dispatch(&mut self, event: UiEvent) -> Vec<UiCommand> {
        match event {
            UiEvent::MapClicked(position) => self.on_map_click(position),
            UiEvent::MarkerClicked(key) => self.on_marker_click(key),
            UiEvent::Submitted(form) => self.on_submit(form),
            UiEvent::RemoveRequested => self.on_remove(),
            UiEvent::LocateRequested => self.on_locate(),
            UiEvent::AddressLookup(address) => self.on_address_lookup(&address),
            UiEvent::SnapshotReceived(places) => self.on_snapshot(places),
        }
    }

    fn on_map_click(&mut self, position: Position) -> Vec<UiCommand> {
        let prior = self.selection.key().cloned();
        self.selection = Selection::Creating { prior };
        vec![UiCommand::BeginCreate(position), UiCommand::SetCenter(position)]
    }

    fn on_marker_click(&mut self, key: PlaceKey) -> Vec<UiCommand> {
        let record = match self.places.iter().find(|p| p.key == key) {
            Some(record) => record,
            None => {
                debug!(key = %key, "click on a marker that is no longer known");
                return Vec::new();
            }
        };

        let commands = vec![
            UiCommand::ShowDetail(DetailPanel::Place {
                title: record.title.clone(),
                content: record.content.clone(),
            }),
            UiCommand::FillForm(PlaceForm::from_record(record)),
            UiCommand::HighlightOnly(key.clone()),
            UiCommand::SetCenter(record.position),
            UiCommand::SetZoom(self.config.focus_zoom),
        ];
        self.selection = Selection::Editing(key);
        commands
    }

    fn on_submit(&mut self, form: PlaceForm) -> Vec<UiCommand> {
        let prior = self.selection.key().cloned();

        match self.resolver.apply_edit(&form, prior.as_ref()) {
            Ok(outcome) => {
                let mut commands = Vec::new();
                if outcome.geocoded {
                    commands.push(UiCommand::FillCoordinates(outcome.position));
                }
                if let Some(orphan) = &outcome.orphan {
                    commands.push(UiCommand::Alert(format!(
                        "Saved, but the old copy at {} could not be removed: {}",
                        orphan.key, orphan.reason
                    )));
                }
                self.pending_center = Some(outcome.position);
                self.selection = Selection::Editing(outcome.key);
                commands
            }
            Err(e) if e.is_validation() => {
                debug!(error = %e, "rejected edit");
                vec![UiCommand::Alert(format!("INVALID DATA: {}", e))]
            }
            Err(e) => {
                warn!(error = %e, "save failed");
                vec![UiCommand::Alert(format!("Could not save place: {}", e))]
            }
        }
    }

    fn on_remove(&mut self) -> Vec<UiCommand> {
        let key = match self.selection.key() {
            Some(key) => key.clone(),
            None => return vec![UiCommand::Alert(PlaceError::NoSelection.to_string())],
        };

        match self.store.remove(&key) {
            Ok(()) => {
                info!(key = %key, "removed place");
                self.selection = Selection::Idle;
                Vec::new()
            }
            Err(e) => {
                warn!(key = %key, error = %e, "remove failed");
                vec![UiCommand::Alert(format!("Could not remove place: {}", e))]
            }
        }
    }

    fn on_locate(&mut self) -> Vec<UiCommand> {
        match self.locator.current_position() {
            Ok(position) => vec![
                UiCommand::FillCoordinates(position),
                UiCommand::SetCenter(position),
            ],
            Err(e) => {
                debug!(error = %e, "device location failed");
                vec![UiCommand::Alert("Could not get location.".to_string())]
            }
        }
    }

    fn on_address_lookup(&mut self, address: &str) -> Vec<UiCommand> {
        let address = address.trim();
        if address.is_empty() {
            return vec![UiCommand::Alert("Enter an address first.".to_string())];
        }

        match self.geocoder.resolve(address) {
            Ok(position) => vec![UiCommand::FillCoordinates(position)],
            Err(e) => {
                debug!(address, error = %e, "address lookup failed");
                vec![UiCommand::Alert(format!("Could not find {:?}.", address))]
            }
        }
    }

    fn on_snapshot(&mut self, places: Vec<PlaceRecord>) -> Vec<UiCommand> {
        if let Some(key) = self.selection.key() {
            if !places.iter().any(|p| &p.key == key) {
                debug!(key = %key, "selected place disappeared");
                self.selection = Selection::Idle;
            }
        }

        self.places = places;
        let plan = self
            .reconciler
            .reconcile(&self.places, self.pending_center.take());
        vec![UiCommand::Render(plan)]
    }
}
