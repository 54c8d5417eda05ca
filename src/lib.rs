pub mod actions;
pub mod entry;
pub mod error;
pub mod events;
pub mod library;
pub mod screen;
pub mod store;

// Re-export main types for convenience
pub use actions::{
    ActionReport, BulkAction, BulkActionDispatcher, LibraryActions, PointAction,
    PointActionHandler,
};
pub use entry::{EpisodeEntry, EpisodeId, PlaybackPosition};
pub use error::{ActionError, LibraryError, MetadataError, ScreenClosed, StoreError};
pub use events::{AppEvent, BulkSignal, EventBus, PlaybackPositionEvent, Received, Subscription};
pub use screen::{Command, CompletedDownloadsScreen, ListView, ScreenHandle, command_channel};
pub use store::{DirectoryStore, EpisodeStore, StoreOptions};
