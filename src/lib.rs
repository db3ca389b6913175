// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mediaflow — an embedded media engine.
//!
//! Playback and recording are driven by a directed graph of processing
//! filters (source → demuxer → decoder → sink, or capture → encoder →
//! muxer → output sink) assembled around a pluggable codec/IO registry.
//! Plugins are chosen at runtime by capability negotiation; each filter
//! pumps buffers on its own worker tasks with pools and back-pressure, and
//! a player/recorder state machine drives the graph through its lifecycle.
//!
//! # Quick start
//!
//! ```ignore
//! use mediaflow::{PlayerEngine, plugin::RegistryBuilder};
//! use mediaflow_plugin_api::MediaSource;
//!
//! let registry = RegistryBuilder::new()
//!     // .source(...) .demuxer(...) .codec(...) .audio_sink(...)
//!     .build();
//! let player = PlayerEngine::new(registry)?;
//! player.set_source(MediaSource::Uri("file:///res/sample.mp3".into()))?;
//! player.prepare()?;
//! player.play()?;
//! # Ok::<(), mediaflow::ErrorCode>(())
//! ```

pub mod error;
pub mod osal;
pub mod pipeline;
pub mod player;
pub mod plugin;
pub mod recorder;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{translate_plugin_status, ErrorCode};
pub use pipeline::{Pipeline, PipelineGraph};
pub use player::{InfoType, PlayerEngine, PlayerErrorType, PlayerObserver, StateId};
pub use plugin::{PluginRegistry, RegistryBuilder};
pub use recorder::{RecorderEngine, RecorderObserver, RecorderState};

// the plugin boundary crate, re-exported for embedders
pub use mediaflow_plugin_api as api;
