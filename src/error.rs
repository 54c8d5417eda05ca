// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

use crate::entry::EpisodeId;

/// Errors that can occur when reading or writing metadata files
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to read metadata file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse metadata JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur when scanning a podcast library
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Library directory does not exist: {0}")]
    LibraryNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to hash audio file {path}: {source}")]
    HashFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

/// Errors returned by an episode store query
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Episode {0} is not part of the library")]
    UnknownEpisode(EpisodeId),

    #[error("Store worker failed: {0}")]
    WorkerFailed(#[from] tokio::task::JoinError),
}

/// Errors that can occur while applying an action to an episode
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to delete audio file {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

/// The screen's command loop has stopped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Screen is closed")]
pub struct ScreenClosed;
