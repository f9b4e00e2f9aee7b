//! A connected map client.
//!
//! The session owns the one live subscription a client holds, feeds its
//! snapshots to the [`InteractionController`], re-subscribes when the channel
//! drops, and releases the subscription on shutdown.

use crate::controller::{InteractionController, UiCommand, UiEvent};
use crate::error::{PlaceError, Result};
use crate::store::PlaceStore;
use crate::subscriptions::{StoreEvent, SubscriptionHandle};
use crate::types::{PlaceRecord, Revision};
use crossbeam_channel::{select, Receiver, TryRecvError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the subscription had queued.
struct Drained {
    newest: Option<(Vec<PlaceRecord>, Revision)>,
    lost: bool,
}

/// A map client bound to a store.
pub struct LiveSession {
    store: Arc<dyn PlaceStore>,
    controller: InteractionController,
    subscription: Option<SubscriptionHandle>,
    last_revision: Option<Revision>,
}

impl LiveSession {
    /// Subscribe to `store` and wrap `controller`.
    pub fn start(store: Arc<dyn PlaceStore>, controller: InteractionController) -> Result<Self> {
        let handle = store.subscribe(controller.config().subscription.clone())?;
        info!(subscription = handle.id.0, "session started");

        Ok(Self {
            store,
            controller,
            subscription: Some(handle),
            last_revision: None,
        })
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Revision of the last snapshot rendered.
    pub fn last_revision(&self) -> Option<Revision> {
        self.last_revision
    }

    /// Handle a UI gesture.
    pub fn handle_ui(&mut self, event: UiEvent) -> Vec<UiCommand> {
        self.controller.dispatch(event)
    }

    /// Render whatever the subscription has queued, without blocking.
    ///
    /// Only the newest queued snapshot is rendered. A dropped channel is
    /// re-subscribed; if that fails the last render stays up, an alert is
    /// returned and the next call tries again.
    pub fn pump(&mut self) -> Result<Vec<UiCommand>> {
        let mut commands = Vec::new();

        if self.subscription.is_none() {
            if let Err(e) = self.reconnect() {
                commands.push(UiCommand::Alert(e.to_string()));
                return Ok(commands);
            }
        }

        loop {
            let drained = self.drain(None);
            commands.extend(self.render(drained.newest));
            if !drained.lost {
                return Ok(commands);
            }
            if let Err(e) = self.reconnect() {
                commands.push(UiCommand::Alert(e.to_string()));
                return Ok(commands);
            }
        }
    }

    /// Re-render from a one-shot read of the store.
    pub fn refresh(&mut self) -> Result<Vec<UiCommand>> {
        let places = self.store.read_all()?;
        Ok(self.controller.dispatch(UiEvent::SnapshotReceived(places)))
    }

    /// Event loop: multiplex store snapshots and UI events until the UI
    /// channel closes, then shut down.
    pub fn run<F>(mut self, ui: &Receiver<UiEvent>, mut sink: F) -> Result<()>
    where
        F: FnMut(UiCommand),
    {
        self.controller.startup_commands().into_iter().for_each(&mut sink);

        loop {
            let live = match &self.subscription {
                Some(handle) => handle.receiver.clone(),
                None => {
                    self.reconnect()?;
                    continue;
                }
            };

            // (subscription lost, ui closed)
            let (lost, ui_closed) = select! {
                recv(live) -> msg => {
                    let drained = match msg {
                        Ok(event) => self.drain(Some(event)),
                        Err(_) => {
                            self.subscription = None;
                            Drained { newest: None, lost: true }
                        }
                    };
                    let lost = drained.lost;
                    self.render(drained.newest).into_iter().for_each(&mut sink);
                    (lost, false)
                },
                recv(ui) -> msg => match msg {
                    Ok(event) => {
                        self.controller.dispatch(event).into_iter().for_each(&mut sink);
                        (false, false)
                    }
                    Err(_) => (false, true),
                },
            };

            if ui_closed {
                break;
            }
            if lost {
                self.reconnect()?;
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Release the subscription.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.subscription.take() {
            info!(subscription = handle.id.0, "session shut down");
            handle.unsubscribe();
        }
    }

    fn drain(&mut self, first: Option<StoreEvent>) -> Drained {
        let mut drained = Drained {
            newest: None,
            lost: false,
        };
        let handle = match &self.subscription {
            Some(handle) => handle,
            None => {
                drained.lost = true;
                return drained;
            }
        };

        let mut pending = first;
        loop {
            let event = match pending.take() {
                Some(event) => event,
                None => match handle.try_recv() {
                    Ok(event) => event,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!(subscription = handle.id.0, "subscription disconnected");
                        drained.lost = true;
                        break;
                    }
                },
            };

            match event {
                StoreEvent::Snapshot { places, revision } => {
                    drained.newest = Some((places, revision));
                }
                StoreEvent::Dropped { reason } => {
                    warn!(subscription = handle.id.0, ?reason, "subscription dropped");
                    drained.lost = true;
                    break;
                }
            }
        }

        if drained.lost {
            self.subscription = None;
        }
        drained
    }

    fn render(&mut self, newest: Option<(Vec<PlaceRecord>, Revision)>) -> Vec<UiCommand> {
        match newest {
            Some((places, revision)) => {
                debug!(?revision, places = places.len(), "rendering snapshot");
                self.last_revision = Some(revision);
                self.controller.dispatch(UiEvent::SnapshotReceived(places))
            }
            None => Vec::new(),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        let config = self.controller.config();
        let attempts = config.resubscribe_attempts.max(1);
        let backoff = config.resubscribe_backoff();
        let subscription = config.subscription.clone();

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=attempts {
            match self.store.subscribe(subscription.clone()) {
                Ok(handle) => {
                    info!(subscription = handle.id.0, attempt, "re-subscribed");
                    self.subscription = Some(handle);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "re-subscribe failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(backoff);
                    }
                }
            }
        }

        Err(PlaceError::SubscriptionLost(format!(
            "gave up after {} attempts: {}",
            attempts, last_error
        )))
    }
}
