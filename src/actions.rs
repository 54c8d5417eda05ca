// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::entry::{EpisodeEntry, EpisodeId};
use crate::error::ActionError;
use crate::events::{AppEvent, EventBus};
use crate::library::{PlaybackQueue, PlayerState, update_episode_metadata};
use crate::store::DirectoryStore;

/// Action applied to every entry of a list at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    Enqueue,
}

/// Action applied to a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointAction {
    Delete,
    Enqueue,
    MarkPlayed,
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Delete => f.write_str("delete"),
            BulkAction::Enqueue => f.write_str("enqueue"),
        }
    }
}

impl fmt::Display for PointAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointAction::Delete => f.write_str("delete"),
            PointAction::Enqueue => f.write_str("enqueue"),
            PointAction::MarkPlayed => f.write_str("mark played"),
        }
    }
}

/// Performs bulk actions off the caller's context
pub trait BulkActionDispatcher: Send + Sync {
    fn dispatch(&self, entries: Vec<EpisodeEntry>, action: BulkAction);
}

/// Performs single-entry actions off the caller's context
pub trait PointActionHandler: Send + Sync {
    fn handle(&self, entry: EpisodeEntry, action: PointAction);
}

/// Outcome of applying an action to a set of episodes
#[derive(Debug, Clone, Default)]
pub struct ActionReport {
    pub succeeded: Vec<EpisodeId>,
    /// Episodes that failed (id, error message)
    pub failed: Vec<(EpisodeId, String)>,
}

impl ActionReport {
    fn fail_all(entries: &[EpisodeEntry], error: &dyn fmt::Display) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: entries
                .iter()
                .map(|entry| (entry.id.clone(), error.to_string()))
                .collect(),
        }
    }
}

/// Applies actions to a library directory and announces the results on the bus
///
/// Clones share one lock, so changes to the library's state files
/// (`queue.json`, `player.json`, episode metadata) never interleave.
#[derive(Debug, Clone)]
pub struct LibraryActions {
    store: DirectoryStore,
    bus: EventBus,
    library_lock: Arc<Mutex<()>>,
}

impl LibraryActions {
    pub fn new(store: DirectoryStore, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            library_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Delete the audio of the given episodes
    ///
    /// Metadata is kept so the episode can be downloaded again. Deleted
    /// episodes are dropped from the queue, and the player is cleared if it
    /// held one of them.
    pub async fn delete_now(&self, entries: &[EpisodeEntry]) -> ActionReport {
        let _guard = self.library_lock.lock().await;
        let root = self.store.root().to_path_buf();
        let owned = entries.to_vec();
        let outcome = tokio::task::spawn_blocking(move || delete_files(&root, &owned)).await;

        let (report, player_cleared) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return ActionReport::fail_all(entries, &e),
        };

        let mut snapshots = Vec::with_capacity(report.succeeded.len());
        for id in &report.succeeded {
            match self.store.entry(id).await {
                Ok(entry) => snapshots.push(entry),
                Err(e) => {
                    warn!(episode = %id, error = %e, "Could not reload deleted episode");
                    if let Some(original) = entries.iter().find(|entry| &entry.id == id) {
                        snapshots.push(EpisodeEntry {
                            downloaded: false,
                            queued: false,
                            playing: false,
                            ..original.clone()
                        });
                    }
                }
            }
        }

        info!(
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "Deleted episodes"
        );

        if !snapshots.is_empty() {
            self.bus.publish(AppEvent::EntriesChanged(snapshots));
        }
        if player_cleared {
            self.bus.publish(AppEvent::PlayerStatusChanged);
        }
        report
    }

    /// Append the given episodes to the playback queue
    pub async fn enqueue_now(&self, entries: &[EpisodeEntry]) -> ActionReport {
        let _guard = self.library_lock.lock().await;
        let root = self.store.root().to_path_buf();
        let ids: Vec<EpisodeId> = entries.iter().map(|entry| entry.id.clone()).collect();
        let outcome = tokio::task::spawn_blocking(move || enqueue_ids(&root, &ids)).await;

        let added = match outcome {
            Ok(Ok(added)) => added,
            Ok(Err(e)) => return ActionReport::fail_all(entries, &e),
            Err(e) => return ActionReport::fail_all(entries, &e),
        };

        let snapshots: Vec<EpisodeEntry> = entries
            .iter()
            .filter(|entry| added.contains(&entry.id))
            .map(|entry| EpisodeEntry {
                queued: true,
                ..entry.clone()
            })
            .collect();

        info!(added = added.len(), "Enqueued episodes");

        if !snapshots.is_empty() {
            self.bus.publish(AppEvent::EntriesChanged(snapshots));
        }

        ActionReport {
            succeeded: entries.iter().map(|entry| entry.id.clone()).collect(),
            failed: Vec::new(),
        }
    }

    /// Mark the given episodes as played and reset their saved position
    pub async fn mark_played_now(&self, entries: &[EpisodeEntry]) -> ActionReport {
        let _guard = self.library_lock.lock().await;
        let owned = entries.to_vec();
        let outcome = tokio::task::spawn_blocking(move || mark_played(&owned)).await;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => return ActionReport::fail_all(entries, &e),
        };

        if !report.succeeded.is_empty() {
            self.bus.publish(AppEvent::UnreadCountChanged);
        }
        report
    }

    async fn run_bulk(&self, entries: Vec<EpisodeEntry>, action: BulkAction) -> ActionReport {
        match action {
            BulkAction::Delete => self.delete_now(&entries).await,
            BulkAction::Enqueue => self.enqueue_now(&entries).await,
        }
    }

    async fn run_point(&self, entry: EpisodeEntry, action: PointAction) -> ActionReport {
        let entries = [entry];
        match action {
            PointAction::Delete => self.delete_now(&entries).await,
            PointAction::Enqueue => self.enqueue_now(&entries).await,
            PointAction::MarkPlayed => self.mark_played_now(&entries).await,
        }
    }
}

fn log_failures(action: &dyn fmt::Display, report: &ActionReport) {
    for (id, error) in &report.failed {
        warn!(episode = %id, %error, "Failed to {action}");
    }
}

impl BulkActionDispatcher for LibraryActions {
    fn dispatch(&self, entries: Vec<EpisodeEntry>, action: BulkAction) {
        let actions = self.clone();
        tokio::spawn(async move {
            let report = actions.run_bulk(entries, action).await;
            log_failures(&action, &report);
        });
    }
}

impl PointActionHandler for LibraryActions {
    fn handle(&self, entry: EpisodeEntry, action: PointAction) {
        let actions = self.clone();
        tokio::spawn(async move {
            let report = actions.run_point(entry, action).await;
            log_failures(&action, &report);
        });
    }
}

fn delete_files(root: &Path, entries: &[EpisodeEntry]) -> (ActionReport, bool) {
    let mut report = ActionReport::default();

    for entry in entries {
        match std::fs::remove_file(&entry.audio_path) {
            Ok(()) => report.succeeded.push(entry.id.clone()),
            // Already gone counts as deleted
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.succeeded.push(entry.id.clone())
            }
            Err(e) => {
                let error = ActionError::DeleteFailed {
                    path: entry.audio_path.clone(),
                    source: e,
                };
                report.failed.push((entry.id.clone(), error.to_string()));
            }
        }
    }

    if report.succeeded.is_empty() {
        return (report, false);
    }

    if let Err(e) = forget_deleted(root, &report.succeeded) {
        warn!(error = %e, "Failed to update queue after delete");
    }

    let player_cleared = match clear_player_if_deleted(root, &report.succeeded) {
        Ok(cleared) => cleared,
        Err(e) => {
            warn!(error = %e, "Failed to update player state after delete");
            false
        }
    };

    (report, player_cleared)
}

fn forget_deleted(root: &Path, ids: &[EpisodeId]) -> Result<(), ActionError> {
    let mut queue = PlaybackQueue::load(root)?;
    if queue.remove(ids) > 0 {
        queue.save(root)?;
    }
    Ok(())
}

fn clear_player_if_deleted(root: &Path, ids: &[EpisodeId]) -> Result<bool, ActionError> {
    match PlayerState::load(root)? {
        Some(state) if ids.contains(&state.episode_id) => {
            PlayerState::clear(root)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn enqueue_ids(root: &Path, ids: &[EpisodeId]) -> Result<Vec<EpisodeId>, ActionError> {
    let mut queue = PlaybackQueue::load(root)?;
    let added = queue.enqueue(ids);
    if !added.is_empty() {
        queue.save(root)?;
    }
    Ok(added)
}

fn mark_played(entries: &[EpisodeEntry]) -> ActionReport {
    let mut report = ActionReport::default();

    for entry in entries {
        let metadata_path = entry
            .audio_path
            .with_file_name(format!("{}.json", entry.id.stem()));
        let result = update_episode_metadata(&metadata_path, |metadata| {
            metadata.played = true;
            metadata.position_secs = 0;
        });
        match result {
            Ok(_) => report.succeeded.push(entry.id.clone()),
            Err(e) => report.failed.push((entry.id.clone(), e.to_string())),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Received;
    use crate::library::read_episode_metadata;
    use crate::library::test_support::{write_episode, write_podcast};
    use crate::store::EpisodeStore;
    use tempfile::tempdir;

    async fn setup(dir: &Path) -> (LibraryActions, EventBus, Vec<EpisodeEntry>) {
        let show = write_podcast(dir, "show", "The Show");
        write_episode(&show, "ep1", None, true);
        write_episode(&show, "ep2", None, true);

        let store = DirectoryStore::new(dir);
        let entries = store.downloaded_items().await.unwrap();
        let bus = EventBus::new();
        (LibraryActions::new(store, bus.clone()), bus, entries)
    }

    #[tokio::test]
    async fn delete_removes_audio_and_publishes_snapshots() {
        let dir = tempdir().unwrap();
        let (actions, bus, entries) = setup(dir.path()).await;
        let mut subscription = bus.subscribe();

        let report = actions.delete_now(&entries[..1]).await;

        assert_eq!(report.succeeded, vec![EpisodeId::new("show/ep1")]);
        assert!(report.failed.is_empty());
        assert!(!dir.path().join("show/ep1.mp3").exists());
        assert!(dir.path().join("show/ep1.json").exists());

        match subscription.recv().await {
            Received::Event(AppEvent::EntriesChanged(changed)) => {
                assert_eq!(changed.len(), 1);
                assert_eq!(changed[0].id.as_str(), "show/ep1");
                assert!(!changed[0].downloaded);
            }
            other => panic!("Expected EntriesChanged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_clears_queue_and_player() {
        let dir = tempdir().unwrap();
        let (actions, bus, entries) = setup(dir.path()).await;
        PlaybackQueue {
            episodes: vec![EpisodeId::new("show/ep1"), EpisodeId::new("show/ep2")],
        }
        .save(dir.path())
        .unwrap();
        PlayerState {
            episode_id: EpisodeId::new("show/ep1"),
            position_secs: 10,
            duration_secs: None,
        }
        .save(dir.path())
        .unwrap();
        let mut subscription = bus.subscribe();

        actions.delete_now(&entries[..1]).await;

        let queue = PlaybackQueue::load(dir.path()).unwrap();
        assert_eq!(queue.episodes, vec![EpisodeId::new("show/ep2")]);
        assert_eq!(PlayerState::load(dir.path()).unwrap(), None);

        assert!(matches!(
            subscription.recv().await,
            Received::Event(AppEvent::EntriesChanged(_))
        ));
        assert_eq!(
            subscription.recv().await,
            Received::Event(AppEvent::PlayerStatusChanged)
        );
    }

    #[tokio::test]
    async fn enqueue_adds_once_and_publishes_new_entries() {
        let dir = tempdir().unwrap();
        let (actions, bus, entries) = setup(dir.path()).await;
        let mut subscription = bus.subscribe();

        actions.enqueue_now(&entries[..1]).await;
        let report = actions.enqueue_now(&entries).await;
        assert_eq!(report.succeeded.len(), 2);

        let queue = PlaybackQueue::load(dir.path()).unwrap();
        assert_eq!(
            queue.episodes,
            vec![EpisodeId::new("show/ep1"), EpisodeId::new("show/ep2")]
        );

        let Received::Event(AppEvent::EntriesChanged(first)) = subscription.recv().await else {
            panic!("Expected EntriesChanged");
        };
        assert_eq!(first.len(), 1);
        assert!(first[0].queued);

        let Received::Event(AppEvent::EntriesChanged(second)) = subscription.recv().await else {
            panic!("Expected EntriesChanged");
        };
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.as_str(), "show/ep2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueues_all_land() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        for n in 0..16 {
            write_episode(&show, &format!("ep{n:02}"), None, true);
        }
        let store = DirectoryStore::new(dir.path());
        let entries = store.downloaded_items().await.unwrap();
        let actions = LibraryActions::new(store, EventBus::new());

        let tasks: Vec<_> = entries
            .iter()
            .cloned()
            .map(|entry| {
                let actions = actions.clone();
                tokio::spawn(async move { actions.enqueue_now(&[entry]).await })
            })
            .collect();
        for task in tasks {
            let report = task.await.unwrap();
            assert!(report.failed.is_empty(), "{:?}", report.failed);
        }

        let mut queued = PlaybackQueue::load(dir.path()).unwrap().episodes;
        queued.sort();
        let mut expected: Vec<_> = entries.iter().map(|entry| entry.id.clone()).collect();
        expected.sort();
        assert_eq!(queued.len(), 16);
        assert_eq!(queued, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn enqueue_and_delete_together_keep_both_changes() {
        let dir = tempdir().unwrap();
        let (actions, _bus, entries) = setup(dir.path()).await;
        PlaybackQueue {
            episodes: vec![EpisodeId::new("show/ep1")],
        }
        .save(dir.path())
        .unwrap();

        let deleting = {
            let actions = actions.clone();
            let target = entries[0].clone();
            tokio::spawn(async move { actions.delete_now(&[target]).await })
        };
        let enqueueing = {
            let actions = actions.clone();
            let target = entries[1].clone();
            tokio::spawn(async move { actions.enqueue_now(&[target]).await })
        };
        deleting.await.unwrap();
        enqueueing.await.unwrap();

        let queue = PlaybackQueue::load(dir.path()).unwrap();
        assert_eq!(queue.episodes, vec![EpisodeId::new("show/ep2")]);
    }

    #[tokio::test]
    async fn mark_played_updates_metadata() {
        let dir = tempdir().unwrap();
        let (actions, bus, entries) = setup(dir.path()).await;
        let mut subscription = bus.subscribe();

        let report = actions.mark_played_now(&entries[1..]).await;

        assert_eq!(report.succeeded, vec![EpisodeId::new("show/ep2")]);
        let metadata = read_episode_metadata(&dir.path().join("show/ep2.json")).unwrap();
        assert!(metadata.played);
        assert_eq!(
            subscription.recv().await,
            Received::Event(AppEvent::UnreadCountChanged)
        );
    }

    #[tokio::test]
    async fn mark_played_reports_missing_metadata() {
        let dir = tempdir().unwrap();
        let (actions, _bus, entries) = setup(dir.path()).await;
        std::fs::remove_file(dir.path().join("show/ep1.json")).unwrap();

        let report = actions.mark_played_now(&entries[..1]).await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_runs_in_background() {
        let dir = tempdir().unwrap();
        let (actions, bus, entries) = setup(dir.path()).await;
        let mut subscription = bus.subscribe();

        actions.dispatch(entries, BulkAction::Delete);

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), subscription.recv())
            .await
            .unwrap();
        let Received::Event(AppEvent::EntriesChanged(changed)) = received else {
            panic!("Expected EntriesChanged");
        };
        assert_eq!(changed.len(), 2);
        assert!(!dir.path().join("show/ep1.mp3").exists());
        assert!(!dir.path().join("show/ep2.mp3").exists());
    }
}
