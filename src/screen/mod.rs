// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The completed downloads screen.
//!
//! [`CompletedDownloadsScreen`] owns the list of downloaded episodes and a
//! [`ListView`] to render it. All list and view mutation happens on the task
//! that owns the screen. Fetches run on a spawned task and post their result
//! back over a channel, tagged with a generation number so that only the
//! latest fetch is ever applied.

mod view;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actions::{BulkAction, BulkActionDispatcher, PointAction, PointActionHandler};
use crate::entry::{EpisodeEntry, index_of};
use crate::error::{ScreenClosed, StoreError};
use crate::events::{AppEvent, BulkSignal, EventBus, PlaybackPositionEvent, Received, Subscription};
use crate::store::EpisodeStore;

pub use view::ListView;

/// Requests sent to a running screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Bulk(BulkAction),
    Point { row: usize, action: PointAction },
    Close,
}

/// Cloneable handle for sending commands to a running screen
#[derive(Debug, Clone)]
pub struct ScreenHandle {
    commands: mpsc::Sender<Command>,
}

/// Create a command channel for [`CompletedDownloadsScreen::run`]
pub fn command_channel(capacity: usize) -> (ScreenHandle, mpsc::Receiver<Command>) {
    let (commands, receiver) = mpsc::channel(capacity);
    (ScreenHandle { commands }, receiver)
}

impl ScreenHandle {
    pub async fn send(&self, command: Command) -> Result<(), ScreenClosed> {
        self.commands.send(command).await.map_err(|_| ScreenClosed)
    }

    pub async fn refresh(&self) -> Result<(), ScreenClosed> {
        self.send(Command::Refresh).await
    }

    pub async fn bulk(&self, action: BulkAction) -> Result<(), ScreenClosed> {
        self.send(Command::Bulk(action)).await
    }

    pub async fn point(&self, row: usize, action: PointAction) -> Result<(), ScreenClosed> {
        self.send(Command::Point { row, action }).await
    }

    pub async fn close(&self) -> Result<(), ScreenClosed> {
        self.send(Command::Close).await
    }
}

struct PendingFetch {
    generation: u64,
    token: CancellationToken,
}

struct FetchOutcome {
    generation: u64,
    result: Result<Vec<EpisodeEntry>, StoreError>,
}

/// Controller for the list of episodes whose audio is fully downloaded
pub struct CompletedDownloadsScreen<V: ListView> {
    store: Arc<dyn EpisodeStore>,
    bulk_actions: Arc<dyn BulkActionDispatcher>,
    point_actions: Arc<dyn PointActionHandler>,
    view: V,
    /// `None` until the first fetch succeeds
    entries: Option<Vec<EpisodeEntry>>,
    pending: Option<PendingFetch>,
    generation: u64,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
}

impl<V: ListView> CompletedDownloadsScreen<V> {
    pub fn new(
        store: Arc<dyn EpisodeStore>,
        bulk_actions: Arc<dyn BulkActionDispatcher>,
        point_actions: Arc<dyn PointActionHandler>,
        view: V,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            store,
            bulk_actions,
            point_actions,
            view,
            entries: None,
            pending: None,
            generation: 0,
            outcome_tx,
            outcome_rx,
        }
    }

    /// The current list, or `None` before the first successful fetch
    pub fn entries(&self) -> Option<&[EpisodeEntry]> {
        self.entries.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Reload the list from the store, superseding any fetch in flight
    pub fn refresh(&mut self) {
        self.cancel_pending();

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();

        self.view.set_loading(true);
        self.view.set_empty_visible(false);

        let store = Arc::clone(&self.store);
        let outcome_tx = self.outcome_tx.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            let mut query = tokio::spawn(async move { store.downloaded_items().await });

            let finished = tokio::select! {
                _ = task_token.cancelled() => None,
                joined = &mut query => Some(joined),
            };

            match finished {
                None => {
                    query.abort();
                    debug!(generation, "Fetch cancelled");
                }
                Some(joined) => {
                    let result = joined.map_err(StoreError::from).and_then(|result| result);
                    // The screen may already be gone
                    let _ = outcome_tx.send(FetchOutcome { generation, result });
                }
            }
        });

        debug!(generation, "Fetch started");
        self.pending = Some(PendingFetch { generation, token });
    }

    /// Wait for the pending fetch, if any, and apply its result
    pub async fn settle(&mut self) {
        while self.pending.is_some() {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.apply_outcome(outcome),
                None => break,
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(generation = pending.generation, "Cancelling fetch");
            pending.token.cancel();
        }
    }

    fn apply_outcome(&mut self, outcome: FetchOutcome) {
        let current = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == outcome.generation);
        if !current {
            debug!(generation = outcome.generation, "Discarding stale fetch result");
            return;
        }

        self.pending = None;
        self.view.set_loading(false);

        match outcome.result {
            Ok(entries) => {
                debug!(count = entries.len(), "Loaded completed downloads");
                self.view.items_replaced(&entries);
                self.view.set_actions_available(!entries.is_empty());
                self.view.set_empty_visible(entries.is_empty());
                self.entries = Some(entries);
            }
            Err(e) => {
                error!(error = %e, "Failed to load completed downloads");
                let empty = self.entries.as_ref().is_some_and(|entries| entries.is_empty());
                self.view.set_empty_visible(empty);
            }
        }
    }

    /// Dispatch an event from the bus to its handler
    pub fn handle_event(&mut self, event: AppEvent) {
        if let Some(signal) = event.bulk_signal() {
            self.on_bulk_signal(signal);
            return;
        }

        match event {
            AppEvent::EntriesChanged(entries) => self.on_entries_changed(entries),
            AppEvent::PlaybackPositionChanged(event) => self.on_playback_position_changed(&event),
            _ => {}
        }
    }

    /// Patch changed episodes into the list without refetching
    pub fn on_entries_changed(&mut self, updated: Vec<EpisodeEntry>) {
        let Some(entries) = self.entries.as_mut() else {
            debug!("List not loaded yet, ignoring entry update");
            return;
        };
        let was_empty = entries.is_empty();

        for entry in updated {
            let Some(index) = index_of(entries, &entry.id) else {
                continue;
            };

            entries.remove(index);
            if entry.downloaded {
                entries.insert(index, entry);
                self.view.item_changed(index, &entries[index]);
            } else {
                debug!(episode = %entry.id, index, "Episode no longer downloaded");
                self.view.item_removed(index);
            }
        }

        if !was_empty && entries.is_empty() {
            self.view.set_actions_available(false);
            self.view.set_empty_visible(true);
        }
    }

    /// Reload after a change too broad to patch
    pub fn on_bulk_signal(&mut self, signal: BulkSignal) {
        debug!(?signal, "Reloading after bulk change");
        self.refresh();
    }

    /// Update the position of the row that is currently playing
    pub fn on_playback_position_changed(&mut self, event: &PlaybackPositionEvent) {
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        if let Some(index) = entries.iter().position(|entry| entry.playing) {
            entries[index].position = event.position;
            self.view.position_updated(index, &event.position);
        }
    }

    /// Apply a bulk action to every entry currently listed
    pub fn request_bulk_action(&self, action: BulkAction) {
        match self.entries.as_ref() {
            Some(entries) if !entries.is_empty() => {
                info!(%action, count = entries.len(), "Requesting bulk action");
                self.bulk_actions.dispatch(entries.clone(), action);
            }
            _ => info!(%action, "No completed downloads, ignoring bulk action"),
        }
    }

    /// Apply an action to the entry shown at `row`
    pub fn request_point_action(&self, row: usize, action: PointAction) {
        let Some(entry) = self.entries.as_ref().and_then(|entries| entries.get(row)) else {
            info!(row, "Selected row is gone, ignoring action");
            return;
        };
        debug!(%action, episode = %entry.id, "Requesting action");
        self.point_actions.handle(entry.clone(), action);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh => self.refresh(),
            Command::Bulk(action) => self.request_bulk_action(action),
            Command::Point { row, action } => self.request_point_action(row, action),
            // Handled by the run loop
            Command::Close => {}
        }
    }

    /// Run the screen until [`Command::Close`] or until every handle is dropped
    ///
    /// Subscribes to the bus, loads the list, and then serves commands, fetch
    /// results and events one at a time. Returns the view after teardown.
    pub async fn run(mut self, bus: EventBus, mut commands: mpsc::Receiver<Command>) -> V {
        let mut subscription = bus.subscribe();
        let mut bus_open = true;
        self.refresh();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(outcome) = self.outcome_rx.recv() => self.apply_outcome(outcome),
                received = subscription.recv(), if bus_open => match received {
                    Received::Event(event) => self.handle_event(event),
                    Received::Lagged(missed) => {
                        warn!(missed, "Missed events, reloading");
                        self.refresh();
                    }
                    Received::Closed => {
                        debug!("Event bus closed");
                        bus_open = false;
                    }
                },
            }
        }

        self.teardown(subscription);
        self.view
    }

    fn teardown(&mut self, subscription: Subscription) {
        // Cancel first so no late result reaches the view
        self.cancel_pending();
        drop(subscription);
        debug!("Screen closed");
    }
}
