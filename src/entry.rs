// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Stable identifier of an episode within a library
///
/// Formed as `<podcast directory>/<metadata file stem>`, which stays the same
/// across scans as long as the files are not renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from the podcast directory name and metadata file stem
    pub fn from_parts(podcast_dir: &str, stem: &str) -> Self {
        Self(format!("{podcast_dir}/{stem}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Podcast directory part of the id
    pub fn podcast_dir(&self) -> Option<&str> {
        self.0.split_once('/').map(|(dir, _)| dir)
    }

    /// Metadata file stem part of the id
    pub fn stem(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, stem)| stem)
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playback progress of an episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub position_secs: u64,
    pub duration_secs: Option<u64>,
}

impl PlaybackPosition {
    pub fn new(position_secs: u64, duration_secs: Option<u64>) -> Self {
        Self {
            position_secs,
            duration_secs,
        }
    }

    /// Fraction played in `0.0..=1.0`, if the duration is known and non-zero
    pub fn fraction(&self) -> Option<f64> {
        match self.duration_secs {
            Some(0) | None => None,
            Some(duration) => Some((self.position_secs.min(duration) as f64) / duration as f64),
        }
    }
}

fn format_clock(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration_secs {
            Some(duration) => write!(
                f,
                "{} / {}",
                format_clock(self.position_secs),
                format_clock(duration)
            ),
            None => f.write_str(&format_clock(self.position_secs)),
        }
    }
}

/// A single episode as shown in the completed downloads list
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeEntry {
    pub id: EpisodeId,
    pub title: String,
    pub podcast_title: String,
    pub pub_date: Option<DateTime<FixedOffset>>,
    /// Full path to the audio file, whether or not it still exists
    pub audio_path: PathBuf,
    pub downloaded: bool,
    pub played: bool,
    pub queued: bool,
    /// Whether this episode is the one loaded in the player
    pub playing: bool,
    pub position: PlaybackPosition,
}

/// Index of the entry with the given id, by linear scan
pub fn index_of(entries: &[EpisodeEntry], id: &EpisodeId) -> Option<usize> {
    entries.iter().position(|entry| &entry.id == id)
}
