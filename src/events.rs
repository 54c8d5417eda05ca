// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tokio::sync::broadcast;

use crate::entry::{EpisodeEntry, EpisodeId, PlaybackPosition};

const DEFAULT_CAPACITY: usize = 64;

/// Live playback progress of the episode loaded in the player
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPositionEvent {
    pub episode_id: Option<EpisodeId>,
    pub position: PlaybackPosition,
}

/// Application-wide change notifications
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// One or more episodes changed; carries their new state
    EntriesChanged(Vec<EpisodeEntry>),

    /// The player reported a new position
    PlaybackPositionChanged(PlaybackPositionEvent),

    /// The player started, stopped or switched episodes
    PlayerStatusChanged,

    /// A download finished, failed or was removed
    DownloadLogChanged,

    /// The set of played/unplayed episodes changed
    UnreadCountChanged,
}

/// Events too broad to patch into a list incrementally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkSignal {
    PlayerStatusChanged,
    DownloadLogChanged,
    UnreadCountChanged,
}

impl AppEvent {
    /// The bulk signal this event represents, if any
    pub fn bulk_signal(&self) -> Option<BulkSignal> {
        match self {
            AppEvent::PlayerStatusChanged => Some(BulkSignal::PlayerStatusChanged),
            AppEvent::DownloadLogChanged => Some(BulkSignal::DownloadLogChanged),
            AppEvent::UnreadCountChanged => Some(BulkSignal::UnreadCountChanged),
            AppEvent::EntriesChanged(_) | AppEvent::PlaybackPositionChanged(_) => None,
        }
    }
}

/// Publish/subscribe channel handed to whoever needs it
///
/// Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` events per slow subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers will receive it
    pub fn publish(&self, event: AppEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe for as long as the returned value lives
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// What a subscription yielded
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Event(AppEvent),
    /// The subscriber fell behind and this many events were dropped
    Lagged(u64),
    /// Every bus handle is gone
    Closed,
}

/// A live subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<AppEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Received {
        match self.receiver.recv().await {
            Ok(event) => Received::Event(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Received::Lagged(missed),
            Err(broadcast::error::RecvError::Closed) => Received::Closed,
        }
    }

    /// Take the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<Received> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Received::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(Received::Lagged(missed)),
            Err(broadcast::error::TryRecvError::Closed) => Some(Received::Closed),
            Err(broadcast::error::TryRecvError::Empty) => None,
        }
    }
}
