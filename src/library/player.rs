// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::metadata::{read_json, write_json};
use crate::entry::EpisodeId;
use crate::error::MetadataError;

pub const PLAYER_FILENAME: &str = "player.json";

/// The episode currently loaded in the player and its live position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub episode_id: EpisodeId,
    pub position_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

impl PlayerState {
    /// Load the player state; `None` when nothing is playing
    pub fn load(library_root: &Path) -> Result<Option<Self>, MetadataError> {
        let path = library_root.join(PLAYER_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn save(&self, library_root: &Path) -> Result<(), MetadataError> {
        write_json(self, &library_root.join(PLAYER_FILENAME))
    }

    /// Remove the player state file if present
    pub fn clear(library_root: &Path) -> Result<(), MetadataError> {
        let path = library_root.join(PLAYER_FILENAME);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MetadataError::WriteFailed { path, source: e }),
        }
    }
}
