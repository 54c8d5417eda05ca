// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::metadata::{read_json, write_json};
use crate::entry::EpisodeId;
use crate::error::MetadataError;

pub const QUEUE_FILENAME: &str = "queue.json";

/// Ordered playback queue, stored at the library root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackQueue {
    pub episodes: Vec<EpisodeId>,
}

impl PlaybackQueue {
    /// Load the queue, treating a missing file as an empty queue
    pub fn load(library_root: &Path) -> Result<Self, MetadataError> {
        let path = library_root.join(QUEUE_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(&path)
    }

    pub fn save(&self, library_root: &Path) -> Result<(), MetadataError> {
        write_json(self, &library_root.join(QUEUE_FILENAME))
    }

    pub fn contains(&self, id: &EpisodeId) -> bool {
        self.episodes.contains(id)
    }

    /// Append ids not already queued, returning the ones that were added
    pub fn enqueue<'a, I>(&mut self, ids: I) -> Vec<EpisodeId>
    where
        I: IntoIterator<Item = &'a EpisodeId>,
    {
        let mut added = Vec::new();
        for id in ids {
            if !self.contains(id) {
                self.episodes.push(id.clone());
                added.push(id.clone());
            }
        }
        added
    }

    /// Remove the given ids, returning how many were removed
    pub fn remove(&mut self, ids: &[EpisodeId]) -> usize {
        let before = self.episodes.len();
        self.episodes.retain(|id| !ids.contains(id));
        before - self.episodes.len()
    }
}
