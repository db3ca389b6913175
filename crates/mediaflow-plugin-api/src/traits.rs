// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The plugin traits consumed by the engine core.
//!
//! Every plugin kind extends [`PluginBase`], which carries the shared
//! lifecycle (`init`/`deinit`/`prepare`/`start`/`stop`/`reset`) and the typed
//! parameter accessors. Plugins are driven from multiple engine worker
//! threads and must synchronize internally; all methods take `&self`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, BufferAllocator};
use crate::meta::Meta;
use crate::source::MediaSource;
use crate::status::Status;
use crate::tag::{Tag, TagValue};

/// Shared plugin lifecycle and parameter surface.
pub trait PluginBase: Send + Sync {
    /// Allocate internal resources.
    fn init(&self) -> Status {
        Status::Ok
    }

    /// Release everything; the instance will not be used again.
    fn deinit(&self) -> Status {
        Status::Ok
    }

    /// Apply configuration and get ready to run.
    fn prepare(&self) -> Status {
        Status::Ok
    }

    /// Begin producing/consuming data.
    fn start(&self) -> Status {
        Status::Ok
    }

    /// Stop producing/consuming data.
    fn stop(&self) -> Status {
        Status::Ok
    }

    /// Return to the post-`init` state, keeping the instance reusable.
    fn reset(&self) -> Status {
        Status::Ok
    }

    /// Read a configuration value.
    fn get_parameter(&self, _tag: Tag) -> Result<TagValue, Status> {
        Err(Status::ErrorNotExisted)
    }

    /// Write a configuration value. The engine type-checks the value against
    /// the tag descriptor table before calling this.
    fn set_parameter(&self, _tag: Tag, _value: TagValue) -> Status {
        Status::Ok
    }
}

/// A byte source.
pub trait SourcePlugin: PluginBase {
    /// Attach the media source to read from.
    fn set_source(&self, source: &MediaSource) -> Status;

    /// Read up to `expected_len` bytes at the current position into `buffer`.
    ///
    /// Returns [`Status::EndOfStream`] once the source is exhausted.
    fn read(&self, buffer: &mut Buffer, expected_len: usize) -> Status;

    /// Total size in bytes, when known.
    fn get_size(&self) -> Option<u64>;

    /// Whether `seek_to` is supported.
    fn is_seekable(&self) -> bool;

    /// Move the read position to an absolute byte offset.
    fn seek_to(&self, offset: u64) -> Status;

    /// Allocator for the memory this source prefers, if it owns one.
    fn get_allocator(&self) -> Option<Arc<dyn BufferAllocator>> {
        None
    }
}

/// Random-access byte window the demuxer filter hands to its plugin.
pub trait DataSource: Send + Sync {
    /// Read `size` bytes at `offset` into `buffer`.
    ///
    /// Returns [`Status::ErrorAgain`] when the bytes are not buffered yet
    /// (push-mode upstream) and [`Status::EndOfStream`] past the end.
    fn read_at(&self, offset: u64, size: usize, buffer: &mut Buffer) -> Status;

    /// Total stream size, when known.
    fn size(&self) -> Option<u64>;
}

/// Parsed container description: global meta plus one meta per track.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// Container-level tags (duration, title, bitrate).
    pub global: Meta,
    /// One meta per track, in stream-index order.
    pub tracks: Vec<Meta>,
}

/// Frame-alignment policy for seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekMode {
    /// Land on the closest sync frame at or before the target.
    PreviousSync,
    /// Land on the closest sync frame at or after the target.
    NextSync,
    /// Land on whichever sync frame is closest.
    ClosestSync,
}

/// A container demuxer.
pub trait DemuxerPlugin: PluginBase {
    /// Attach the byte window to parse.
    fn set_data_source(&self, source: Arc<dyn DataSource>) -> Status;

    /// Parse headers and describe the container.
    fn get_media_info(&self) -> Result<MediaInfo, Status>;

    /// Read the next frame into `buffer`, setting its `stream_index`.
    ///
    /// Returns [`Status::EndOfStream`] after the last frame and
    /// [`Status::ErrorAgain`] when more source bytes are needed first.
    fn read_frame(&self, buffer: &mut Buffer, timeout_ms: u64) -> Status;

    /// Seek to `time` (engine ticks). `track` of `None` seeks the whole
    /// container; the plugin is authoritative on frame alignment.
    fn seek_to(&self, track: Option<u32>, time: i64, mode: SeekMode) -> Status;

    /// Number of tracks found.
    fn get_track_count(&self) -> u32;

    /// Include a track in `read_frame` output.
    fn select_track(&self, _track: u32) -> Status {
        Status::Ok
    }

    /// Exclude a track from `read_frame` output.
    fn unselect_track(&self, _track: u32) -> Status {
        Status::Ok
    }
}

/// A buffer handed back because the plugin could not accept it.
#[derive(Debug)]
pub struct BufferRejected {
    /// Why the buffer was rejected; [`Status::ErrorAgain`] is back-pressure.
    pub status: Status,
    /// The buffer, unchanged, for the caller to retry or drop.
    pub buffer: Buffer,
}

/// Completion callbacks a codec fires as it finishes buffers.
pub trait CodecDataCallback: Send + Sync {
    /// An input buffer has been fully consumed.
    fn on_input_buffer_done(&self, buffer: Buffer);

    /// An output buffer has been filled and is ready downstream.
    fn on_output_buffer_done(&self, buffer: Buffer);
}

/// A decoder or encoder.
pub trait CodecPlugin: PluginBase {
    /// Drop all queued data, keeping configuration.
    fn flush(&self) -> Status {
        Status::Ok
    }

    /// Install the completion callbacks.
    fn set_data_callback(&self, callback: Arc<dyn CodecDataCallback>) -> Status;

    /// Submit a filled input buffer.
    ///
    /// On [`Status::ErrorAgain`] the buffer comes back and the caller must
    /// wait for an output completion before retrying.
    fn queue_input_buffer(&self, buffer: Buffer, timeout_ms: i64) -> Result<(), BufferRejected>;

    /// Hand an empty output buffer for the codec to fill.
    fn queue_output_buffer(&self, buffer: Buffer, timeout_ms: i64) -> Result<(), BufferRejected>;

    /// Allocator for the memory this codec prefers, if it owns one.
    fn get_allocator(&self) -> Option<Arc<dyn BufferAllocator>> {
        None
    }
}

/// An audio renderer.
pub trait AudioSinkPlugin: PluginBase {
    /// Park playback, keeping position.
    fn pause(&self) -> Status {
        Status::Ok
    }

    /// Continue after `pause`.
    fn resume(&self) -> Status {
        Status::Ok
    }

    /// Drop queued samples.
    fn flush(&self) -> Status {
        Status::Ok
    }

    /// Render one buffer of samples.
    fn write(&self, buffer: &Buffer) -> Status;

    /// Set the output volume, normalized to `[0.0, 1.0]`.
    fn set_volume(&self, volume: f32) -> Status;

    /// Render latency in engine ticks.
    fn get_latency(&self) -> i64 {
        0
    }
}

/// A video renderer.
pub trait VideoSinkPlugin: PluginBase {
    /// Park rendering.
    fn pause(&self) -> Status {
        Status::Ok
    }

    /// Continue after `pause`.
    fn resume(&self) -> Status {
        Status::Ok
    }

    /// Drop queued frames.
    fn flush(&self) -> Status {
        Status::Ok
    }

    /// Render one frame.
    fn write(&self, buffer: &Buffer) -> Status;

    /// Render latency in engine ticks.
    fn get_latency(&self) -> i64 {
        0
    }
}

/// A container muxer. Produces container bytes into caller-provided buffers.
pub trait MuxerPlugin: PluginBase {
    /// Register a track; returns the track id used by `write_frame`.
    fn add_track(&self, track_meta: &Meta) -> Result<u32, Status>;

    /// Emit the container header into `out`.
    fn write_header(&self, out: &mut Buffer) -> Status;

    /// Serialize one frame of `track` into `out`.
    fn write_frame(&self, track: u32, frame: &Buffer, out: &mut Buffer) -> Status;

    /// Emit the container trailer into `out`.
    fn write_trailer(&self, out: &mut Buffer) -> Status;
}

/// A byte sink owning the output descriptor.
pub trait OutputSinkPlugin: PluginBase {
    /// Attach the output descriptor.
    fn set_fd(&self, fd: i32) -> Status;

    /// Append container bytes.
    fn write(&self, buffer: &Buffer) -> Status;

    /// Reposition the write cursor (descriptor permitting).
    fn seek(&self, _offset: u64) -> Status {
        Status::ErrorUnimplemented
    }
}
