// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mediaflow Plugin API
//!
//! This crate defines the boundary between the Mediaflow engine core and its
//! media plugins: sources, demuxers, codecs, sinks and muxers. The engine
//! never depends on a concrete plugin implementation; it negotiates against
//! [`Capability`] descriptors published by each plugin, configures the chosen
//! plugin through typed [`Tag`]/[`TagValue`] parameters and pumps [`Buffer`]s
//! through the trait objects defined here.
//!
//! # Example plugin
//!
//! ```ignore
//! use mediaflow_plugin_api::*;
//!
//! struct PcmSink { /* ... */ }
//!
//! impl PluginBase for PcmSink {
//!     fn set_parameter(&self, tag: Tag, value: TagValue) -> Status {
//!         // tag/value type discipline is enforced by the engine before
//!         // this is called
//!         Status::Ok
//!     }
//! }
//!
//! impl AudioSinkPlugin for PcmSink {
//!     fn write(&self, buffer: &Buffer) -> Status { /* ... */ Status::Ok }
//!     fn set_volume(&self, _volume: f32) -> Status { Status::Ok }
//! }
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod caps;
pub mod info;
pub mod meta;
pub mod mime;
pub mod source;
pub mod status;
pub mod tag;
pub mod time;
pub mod traits;

pub use buffer::{Buffer, BufferAllocator, BufferFlags, MediaType, Memory, MemoryKind, MemoryReclaimer};
pub use caps::{CapValueSet, Capability};
pub use info::{PluginInfo, PluginType};
pub use meta::Meta;
pub use source::{MediaSource, ProtocolKind};
pub use status::Status;
pub use tag::{
    default_tag_value, tag_descriptor, validate_tag_value, AudioAacProfile, AudioAacStreamFormat,
    AudioChannelLayout, AudioSampleFormat, Tag, TagDescriptor, TagValue, VideoPixelFormat,
};
pub use time::{hst_time_to_ms, ms_to_hst_time, HST_MSECOND, HST_SECOND, HST_TIME_NONE};
pub use traits::{
    AudioSinkPlugin, BufferRejected, CodecDataCallback, CodecPlugin, DataSource, DemuxerPlugin,
    MediaInfo, MuxerPlugin, OutputSinkPlugin, SeekMode, SourcePlugin, PluginBase, VideoSinkPlugin,
};
