// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-track playback statistics.
//!
//! One entry per media type; sinks report their render position and their
//! completion through pipeline events. Playback is complete only when every
//! track completed; the reported position is the furthest track.

use mediaflow_plugin_api::MediaType;
use parking_lot::Mutex;

struct MediaStat {
    media_type: MediaType,
    position: i64,
    complete: bool,
}

/// Position/completion tracker for the active tracks.
#[derive(Default)]
pub struct MediaStats {
    stats: Mutex<Vec<MediaStat>>,
}

impl MediaStats {
    /// Empty tracker.
    pub fn new() -> Self {
        MediaStats::default()
    }

    /// Forget all tracks.
    pub fn reset(&self) {
        self.stats.lock().clear();
    }

    /// Register a track of `media_type` (idempotent).
    pub fn append(&self, media_type: MediaType) {
        let mut stats = self.stats.lock();
        if stats.iter().any(|s| s.media_type == media_type) {
            return;
        }
        stats.push(MediaStat {
            media_type,
            position: 0,
            complete: false,
        });
    }

    /// Record a render position for `media_type`.
    pub fn on_progress(&self, media_type: MediaType, position: i64) {
        let mut stats = self.stats.lock();
        if let Some(stat) = stats.iter_mut().find(|s| s.media_type == media_type) {
            stat.position = position;
        }
    }

    /// Record completion for `media_type`; returns whether every registered
    /// track has now completed.
    pub fn on_complete(&self, media_type: MediaType) -> bool {
        let mut stats = self.stats.lock();
        if let Some(stat) = stats.iter_mut().find(|s| s.media_type == media_type) {
            stat.complete = true;
        }
        !stats.is_empty() && stats.iter().all(|s| s.complete)
    }

    /// Force every track's position (used after a seek).
    pub fn set_all_positions(&self, position: i64) {
        let mut stats = self.stats.lock();
        for stat in stats.iter_mut() {
            stat.position = position;
            stat.complete = false;
        }
    }

    /// Furthest track position.
    pub fn current_position(&self) -> i64 {
        self.stats
            .lock()
            .iter()
            .map(|s| s.position)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_requires_all_tracks() {
        let stats = MediaStats::new();
        stats.append(MediaType::Audio);
        stats.append(MediaType::Video);
        stats.append(MediaType::Audio); // idempotent
        assert!(!stats.on_complete(MediaType::Audio));
        assert!(stats.on_complete(MediaType::Video));
    }

    #[test]
    fn test_position_is_max_across_tracks() {
        let stats = MediaStats::new();
        stats.append(MediaType::Audio);
        stats.append(MediaType::Video);
        stats.on_progress(MediaType::Audio, 1_000);
        stats.on_progress(MediaType::Video, 3_000);
        assert_eq!(stats.current_position(), 3_000);
        stats.set_all_positions(500);
        assert_eq!(stats.current_position(), 500);
    }

    #[test]
    fn test_empty_tracker_never_completes() {
        let stats = MediaStats::new();
        assert!(!stats.on_complete(MediaType::Audio));
        assert_eq!(stats.current_position(), 0);
    }
}
