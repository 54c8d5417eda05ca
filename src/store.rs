// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::entry::{EpisodeEntry, EpisodeId, PlaybackPosition};
use crate::error::{LibraryError, StoreError};
use crate::library::{
    EpisodeFile, PlaybackQueue, PlayerState, PodcastDir, content_matches, find_episode,
    scan_library,
};

/// Source of completed downloads
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// All episodes whose audio is fully downloaded, in display order
    async fn downloaded_items(&self) -> Result<Vec<EpisodeEntry>, StoreError>;
}

/// Options for reading a library
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Treat audio whose content hash differs from its metadata as not downloaded
    pub verify_hashes: bool,
}

/// Episode store backed by a podpull library directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    options: StoreOptions,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a single episode, downloaded or not
    pub async fn entry(&self, id: &EpisodeId) -> Result<EpisodeEntry, StoreError> {
        let store = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || store.load_entry(&id)).await?
    }

    fn load_entry(&self, id: &EpisodeId) -> Result<EpisodeEntry, StoreError> {
        let Some((podcast, episode)) = find_episode(&self.root, id)? else {
            return Err(StoreError::UnknownEpisode(id.clone()));
        };
        let queue = PlaybackQueue::load(&self.root).map_err(LibraryError::from)?;
        let player = PlayerState::load(&self.root).map_err(LibraryError::from)?;
        Ok(self.build_entry(&podcast, &episode, &queue, player.as_ref()))
    }

    fn load_downloaded(&self) -> Result<Vec<EpisodeEntry>, StoreError> {
        let scan = scan_library(&self.root)?;
        let queue = PlaybackQueue::load(&self.root).map_err(LibraryError::from)?;
        let player = PlayerState::load(&self.root).map_err(LibraryError::from)?;

        let mut entries = Vec::new();
        for (podcast, episode) in scan.episodes() {
            let entry = self.build_entry(podcast, episode, &queue, player.as_ref());
            if entry.downloaded {
                entries.push(entry);
            }
        }

        entries.sort_by(display_order);
        debug!(count = entries.len(), "Loaded downloaded episodes");
        Ok(entries)
    }

    fn build_entry(
        &self,
        podcast: &PodcastDir,
        episode: &EpisodeFile,
        queue: &PlaybackQueue,
        player: Option<&PlayerState>,
    ) -> EpisodeEntry {
        let audio_path = episode.audio_path();
        let downloaded = self.is_downloaded(episode, &audio_path);
        let live = player.filter(|state| state.episode_id == episode.id);
        let metadata = &episode.metadata;

        let position = match live {
            Some(state) => PlaybackPosition::new(
                state.position_secs,
                state.duration_secs.or_else(|| metadata.duration_secs()),
            ),
            None => PlaybackPosition::new(metadata.position_secs, metadata.duration_secs()),
        };

        EpisodeEntry {
            id: episode.id.clone(),
            title: metadata.title.clone(),
            podcast_title: podcast.title.clone(),
            pub_date: metadata.parsed_pub_date(),
            audio_path,
            downloaded,
            played: metadata.played,
            queued: queue.contains(&episode.id),
            playing: live.is_some(),
            position,
        }
    }

    fn is_downloaded(&self, episode: &EpisodeFile, audio_path: &Path) -> bool {
        if !audio_path.is_file() {
            return false;
        }
        if !self.options.verify_hashes {
            return true;
        }
        match &episode.metadata.content_hash {
            Some(expected) => hash_verdict(&episode.id, content_matches(audio_path, expected)),
            // Nothing to verify against
            None => true,
        }
    }
}

/// Whether a hash check counts as downloaded; unreadable audio does not
fn hash_verdict(id: &EpisodeId, checked: Result<bool, LibraryError>) -> bool {
    match checked {
        Ok(true) => true,
        Ok(false) => {
            warn!(episode = %id, "Audio content hash mismatch");
            false
        }
        Err(e) => {
            warn!(episode = %id, error = %e, "Could not verify audio, treating as not downloaded");
            false
        }
    }
}

/// Newest first, undated last, ties by id
fn display_order(a: &EpisodeEntry, b: &EpisodeEntry) -> Ordering {
    match (a.pub_date, b.pub_date) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl EpisodeStore for DirectoryStore {
    async fn downloaded_items(&self) -> Result<Vec<EpisodeEntry>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_downloaded()).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::content_hash;
    use crate::library::test_support::{write_episode, write_podcast};
    use crate::library::{EpisodeMetadata, update_episode_metadata};
    use tempfile::tempdir;

    fn ids(entries: &[EpisodeEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn returns_only_downloaded_newest_first() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "old", Some("2024-01-01T00:00:00+00:00"), true);
        write_episode(&show, "new", Some("2024-03-01T00:00:00+00:00"), true);
        write_episode(&show, "undated", None, true);
        write_episode(&show, "missing", Some("2024-02-01T00:00:00+00:00"), false);

        let store = DirectoryStore::new(dir.path());
        let entries = store.downloaded_items().await.unwrap();

        assert_eq!(ids(&entries), vec!["show/new", "show/old", "show/undated"]);
        assert!(entries.iter().all(|e| e.downloaded));
        assert_eq!(entries[0].podcast_title, "The Show");
        assert_eq!(entries[0].position, PlaybackPosition::new(0, Some(1800)));
    }

    #[tokio::test]
    async fn merges_queue_and_player_state() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "ep1", None, true);
        write_episode(&show, "ep2", None, true);

        PlaybackQueue {
            episodes: vec![EpisodeId::new("show/ep2")],
        }
        .save(dir.path())
        .unwrap();
        PlayerState {
            episode_id: EpisodeId::new("show/ep1"),
            position_secs: 90,
            duration_secs: None,
        }
        .save(dir.path())
        .unwrap();

        let entries = DirectoryStore::new(dir.path()).downloaded_items().await.unwrap();

        assert!(entries[0].playing);
        assert!(!entries[0].queued);
        assert_eq!(entries[0].position, PlaybackPosition::new(90, Some(1800)));
        assert!(!entries[1].playing);
        assert!(entries[1].queued);
    }

    #[tokio::test]
    async fn saved_position_and_played_come_from_metadata() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "ep1", None, true);
        update_episode_metadata(&show.join("ep1.json"), |m: &mut EpisodeMetadata| {
            m.played = true;
            m.position_secs = 300;
        })
        .unwrap();

        let entries = DirectoryStore::new(dir.path()).downloaded_items().await.unwrap();

        assert!(entries[0].played);
        assert_eq!(entries[0].position.position_secs, 300);
    }

    #[tokio::test]
    async fn verify_hashes_drops_corrupted_audio() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "good", None, true);
        write_episode(&show, "bad", None, true);

        let good_hash = content_hash(&show.join("good.mp3")).unwrap();
        update_episode_metadata(&show.join("good.json"), |m| {
            m.content_hash = Some(good_hash.clone());
        })
        .unwrap();
        update_episode_metadata(&show.join("bad.json"), |m| {
            m.content_hash = Some("sha256:0000".to_string());
        })
        .unwrap();

        let lenient = DirectoryStore::new(dir.path()).downloaded_items().await.unwrap();
        assert_eq!(lenient.len(), 2);

        let strict = DirectoryStore::with_options(
            dir.path(),
            StoreOptions {
                verify_hashes: true,
            },
        )
        .downloaded_items()
        .await
        .unwrap();
        assert_eq!(ids(&strict), vec!["show/good"]);
    }

    #[test]
    fn unreadable_audio_counts_as_not_downloaded() {
        let id = EpisodeId::new("show/ep1");
        let unreadable = Err(LibraryError::HashFailed {
            path: PathBuf::from("/library/show/ep1.mp3"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });

        assert!(!hash_verdict(&id, unreadable));
        assert!(!hash_verdict(&id, Ok(false)));
        assert!(hash_verdict(&id, Ok(true)));
    }

    #[tokio::test]
    async fn fetch_leaves_in_progress_downloads_alone() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "ep1", None, true);
        let partial = show.join("ep2.mp3.partial");
        std::fs::write(&partial, b"still downloading").unwrap();

        let entries = DirectoryStore::new(dir.path()).downloaded_items().await.unwrap();

        assert_eq!(ids(&entries), vec!["show/ep1"]);
        assert_eq!(std::fs::read(&partial).unwrap(), b"still downloading");
    }

    #[tokio::test]
    async fn missing_library_fails() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("gone"));

        let result = store.downloaded_items().await;

        assert!(matches!(
            result,
            Err(StoreError::Library(LibraryError::LibraryNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn entry_loads_episode_that_is_not_downloaded() {
        let dir = tempdir().unwrap();
        let show = write_podcast(dir.path(), "show", "The Show");
        write_episode(&show, "ep1", None, false);

        let store = DirectoryStore::new(dir.path());
        let entry = store.entry(&EpisodeId::new("show/ep1")).await.unwrap();
        assert!(!entry.downloaded);

        let missing = store.entry(&EpisodeId::new("show/nope")).await;
        assert!(matches!(missing, Err(StoreError::UnknownEpisode(_))));
    }
}
