// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Events flowing from filters to the pipeline and on to the engine.

use crate::error::ErrorCode;

/// What a filter reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The filter finished preparing and can accept data.
    Ready,
    /// A fatal error; the engine surfaces it to the observer.
    Error(ErrorCode),
    /// The audio sink consumed the end-of-stream marker.
    AudioComplete,
    /// The video sink consumed the end-of-stream marker.
    VideoComplete,
    /// Audio render position in engine ticks.
    AudioProgress(i64),
    /// Video render position in engine ticks.
    VideoProgress(i64),
    /// Source buffering progress in percent.
    BufferingProgress(u32),
    /// The output sink wrote the complete container (recorder path).
    OutputComplete,
}

/// An event with its originating filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Name of the filter that raised the event.
    pub source: String,
    /// The event itself.
    pub kind: EventKind,
}

/// Receiver of pipeline events (implemented by the player/recorder engines).
pub trait EventReceiver: Send + Sync {
    /// Handle one event. Called from filter worker threads; must not block
    /// on pipeline lifecycle operations.
    fn on_event(&self, event: Event);
}
