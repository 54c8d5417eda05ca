// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::entry::{EpisodeEntry, PlaybackPosition};

/// Rendering sink for the completed downloads list.
///
/// Every method is called from the task that owns the screen, never
/// concurrently. Row indices refer to the list as it is after the change.
pub trait ListView: Send {
    /// Show or hide the loading indicator
    fn set_loading(&mut self, loading: bool);

    /// Show or hide the "no completed downloads" placeholder
    fn set_empty_visible(&mut self, visible: bool);

    /// Whether bulk actions can be offered (the list is non-empty)
    fn set_actions_available(&mut self, available: bool);

    /// The whole list was replaced
    fn items_replaced(&mut self, entries: &[EpisodeEntry]);

    /// The row at `index` now shows `entry`
    fn item_changed(&mut self, index: usize, entry: &EpisodeEntry);

    /// The row at `index` was removed
    fn item_removed(&mut self, index: usize);

    /// Only the playback position of the row at `index` changed
    fn position_updated(&mut self, index: usize, position: &PlaybackPosition);
}
