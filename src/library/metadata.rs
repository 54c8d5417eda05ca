// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::MetadataError;

pub const PODCAST_METADATA_FILENAME: &str = "podcast.json";

/// Metadata stored next to each downloaded episode
///
/// Files written by podpull lack `played` and `position_secs`; both default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub original_url: String,
    pub downloaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    pub audio_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub position_secs: u64,
}

impl EpisodeMetadata {
    /// Publication date, if present and valid RFC 3339
    pub fn parsed_pub_date(&self) -> Option<DateTime<FixedOffset>> {
        self.pub_date
            .as_deref()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
    }

    /// Duration in seconds, parsed from the feed's `HH:MM:SS`, `MM:SS` or plain seconds form
    pub fn duration_secs(&self) -> Option<u64> {
        parse_duration(self.duration.as_deref()?)
    }
}

fn parse_duration(value: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for part in parts {
        let n: u64 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(n)?;
    }
    Some(total)
}

/// Metadata for a podcast directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub feed_url: String,
    pub updated_at: String,
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MetadataError> {
    let content = std::fs::read_to_string(path).map_err(|e| MetadataError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| MetadataError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `value` as JSON, replacing `path` atomically
///
/// Concurrent readers see either the old or the new file, never a partial one.
pub(crate) fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), MetadataError> {
    let json = serde_json::to_string_pretty(value)?;
    let write_err = |e: std::io::Error| MetadataError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Read episode metadata from a JSON file
pub fn read_episode_metadata(path: &Path) -> Result<EpisodeMetadata, MetadataError> {
    read_json(path)
}

/// Write episode metadata to a JSON file
pub fn write_episode_metadata(metadata: &EpisodeMetadata, path: &Path) -> Result<(), MetadataError> {
    write_json(metadata, path)
}

/// Read, modify and write back episode metadata
pub fn update_episode_metadata<F>(path: &Path, update: F) -> Result<EpisodeMetadata, MetadataError>
where
    F: FnOnce(&mut EpisodeMetadata),
{
    let mut metadata = read_episode_metadata(path)?;
    update(&mut metadata);
    write_episode_metadata(&metadata, path)?;
    Ok(metadata)
}

/// Read podcast metadata from a podcast directory
pub fn read_podcast_metadata(podcast_dir: &Path) -> Result<PodcastMetadata, MetadataError> {
    read_json(&podcast_dir.join(PODCAST_METADATA_FILENAME))
}

/// Write podcast metadata into a podcast directory
pub fn write_podcast_metadata(
    metadata: &PodcastMetadata,
    podcast_dir: &Path,
) -> Result<(), MetadataError> {
    write_json(metadata, &podcast_dir.join(PODCAST_METADATA_FILENAME))
}
