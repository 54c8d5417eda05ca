// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod metadata;
mod player;
mod queue;
mod verify;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::entry::EpisodeId;
use crate::error::LibraryError;

pub use metadata::{
    EpisodeMetadata, PODCAST_METADATA_FILENAME, PodcastMetadata, read_episode_metadata,
    read_podcast_metadata, update_episode_metadata, write_episode_metadata,
    write_podcast_metadata,
};
pub use player::{PLAYER_FILENAME, PlayerState};
pub use queue::{PlaybackQueue, QUEUE_FILENAME};
pub use verify::{content_hash, matches as content_matches};

/// A podcast directory found in the library
#[derive(Debug, Clone)]
pub struct PodcastDir {
    /// Directory name, used as the first part of episode ids
    pub dir_name: String,
    pub title: String,
    pub episodes: Vec<EpisodeFile>,
}

/// An episode metadata file and its parsed content
#[derive(Debug, Clone)]
pub struct EpisodeFile {
    pub id: EpisodeId,
    pub metadata_path: PathBuf,
    pub metadata: EpisodeMetadata,
}

impl EpisodeFile {
    /// Path of the audio file this metadata refers to
    pub fn audio_path(&self) -> PathBuf {
        self.metadata_path
            .parent()
            .map(|dir| dir.join(&self.metadata.audio_filename))
            .unwrap_or_else(|| PathBuf::from(&self.metadata.audio_filename))
    }
}

/// Result of scanning a library root
#[derive(Debug, Clone)]
pub struct LibraryScan {
    pub podcasts: Vec<PodcastDir>,
}

impl LibraryScan {
    pub fn episodes(&self) -> impl Iterator<Item = (&PodcastDir, &EpisodeFile)> {
        self.podcasts
            .iter()
            .flat_map(|podcast| podcast.episodes.iter().map(move |ep| (podcast, ep)))
    }
}

fn dir_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

fn is_podcast_dir(path: &Path) -> bool {
    path.join(PODCAST_METADATA_FILENAME).is_file()
}

/// Scan a library root for podcast directories and their episodes
///
/// The root may itself be a podpull output directory, or contain one
/// sub-directory per podcast. The scan only reads; `.partial` files belong
/// to downloads that may still be running and are left alone.
pub fn scan_library(root: &Path) -> Result<LibraryScan, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::LibraryNotFound(root.to_path_buf()));
    }

    let mut podcast_paths = Vec::new();
    if is_podcast_dir(root) {
        podcast_paths.push(root.to_path_buf());
    }

    let entries = std::fs::read_dir(root).map_err(|e| LibraryError::ReadDirectoryFailed {
        path: root.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| LibraryError::ReadDirectoryFailed {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() && is_podcast_dir(&path) {
            podcast_paths.push(path);
        }
    }
    podcast_paths.sort();

    let mut podcasts = Vec::with_capacity(podcast_paths.len());
    for path in podcast_paths {
        podcasts.push(scan_podcast_dir(&path)?);
    }

    debug!(
        root = %root.display(),
        podcasts = podcasts.len(),
        "Scanned library"
    );

    Ok(LibraryScan { podcasts })
}

fn scan_podcast_dir(path: &Path) -> Result<PodcastDir, LibraryError> {
    let dir_name = dir_name_of(path);
    let title = match read_podcast_metadata(path) {
        Ok(podcast) => podcast.title,
        Err(e) => {
            warn!(error = %e, "Unreadable podcast metadata, using directory name");
            dir_name.clone()
        }
    };

    let entries = std::fs::read_dir(path).map_err(|e| LibraryError::ReadDirectoryFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut episodes = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| LibraryError::ReadDirectoryFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file_path = entry.path();
        let filename = dir_name_of(&file_path);

        // Audio files and in-progress `.partial` downloads are skipped
        if !filename.ends_with(".json") || filename == PODCAST_METADATA_FILENAME {
            continue;
        }

        let stem = filename.trim_end_matches(".json");
        match read_episode_metadata(&file_path) {
            Ok(metadata) => episodes.push(EpisodeFile {
                id: EpisodeId::from_parts(&dir_name, stem),
                metadata_path: file_path,
                metadata,
            }),
            Err(e) => warn!(error = %e, "Skipping unreadable episode metadata"),
        }
    }

    episodes.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(PodcastDir {
        dir_name,
        title,
        episodes,
    })
}

/// Locate the podcast directory that an episode id refers to
pub fn podcast_dir_for(root: &Path, id: &EpisodeId) -> Option<PathBuf> {
    let dir_name = id.podcast_dir()?;
    let nested = root.join(dir_name);
    if is_podcast_dir(&nested) {
        return Some(nested);
    }
    if is_podcast_dir(root) && dir_name_of(root) == dir_name {
        return Some(root.to_path_buf());
    }
    None
}

/// Load a single episode by id without scanning the whole library
pub fn find_episode(root: &Path, id: &EpisodeId) -> Result<Option<(PodcastDir, EpisodeFile)>, LibraryError> {
    let Some(podcast_path) = podcast_dir_for(root, id) else {
        return Ok(None);
    };
    let metadata_path = podcast_path.join(format!("{}.json", id.stem()));
    if !metadata_path.is_file() {
        return Ok(None);
    }

    let metadata = read_episode_metadata(&metadata_path)?;
    let dir_name = dir_name_of(&podcast_path);
    let title = read_podcast_metadata(&podcast_path)
        .map(|podcast| podcast.title)
        .unwrap_or_else(|_| dir_name.clone());

    let episode = EpisodeFile {
        id: id.clone(),
        metadata_path,
        metadata,
    };
    let podcast = PodcastDir {
        dir_name,
        title,
        episodes: Vec::new(),
    };
    Ok(Some((podcast, episode)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn write_podcast(root: &Path, dir_name: &str, title: &str) -> PathBuf {
        let dir = root.join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        write_podcast_metadata(
            &PodcastMetadata {
                title: title.to_string(),
                description: None,
                link: None,
                author: None,
                image_url: None,
                feed_url: format!("https://example.com/{dir_name}.xml"),
                updated_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
            &dir,
        )
        .unwrap();
        dir
    }

    /// Write episode metadata and, when `with_audio` is set, its audio file
    pub fn write_episode(
        podcast_dir: &Path,
        stem: &str,
        pub_date: Option<&str>,
        with_audio: bool,
    ) -> EpisodeMetadata {
        let audio_filename = format!("{stem}.mp3");
        let metadata = EpisodeMetadata {
            title: format!("Episode {stem}"),
            pub_date: pub_date.map(String::from),
            guid: Some(format!("guid-{stem}")),
            original_url: format!("https://example.com/{audio_filename}"),
            downloaded_at: "2024-02-01T00:00:00+00:00".to_string(),
            duration: Some("30:00".to_string()),
            audio_filename: audio_filename.clone(),
            ..Default::default()
        };
        write_episode_metadata(&metadata, &podcast_dir.join(format!("{stem}.json"))).unwrap();
        if with_audio {
            std::fs::write(podcast_dir.join(&audio_filename), b"fake audio").unwrap();
        }
        metadata
    }
}
