// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration tags and their typed values.
//!
//! Tags are the currency of plugin configuration and stream description: a
//! [`crate::Meta`] maps tags to values, and [`crate::PluginBase::set_parameter`]
//! takes a tag/value pair. Each recognized tag has an entry in the descriptor
//! table with a symbolic name, a default value used for type comparison, and
//! a human-readable type name; the engine rejects a `set_parameter` whose
//! value type does not match the descriptor.

use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferAllocator;

/// A recognized configuration or description tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    /// MIME type of the stream.
    Mime,
    /// Track index inside a container.
    TrackId,
    /// Number of output buffers the codec needs queued.
    RequiredOutBufferCnt,
    /// Allocator a plugin exposes for its preferred memory.
    BufferAllocator,
    /// Source buffering size in bytes.
    BufferingSize,
    /// High waterline for source buffering.
    WaterlineHigh,
    /// Low waterline for source buffering.
    WaterlineLow,
    /// Title of the media.
    MediaTitle,
    /// Artist of the media.
    MediaArtist,
    /// Album of the media.
    MediaAlbum,
    /// Release date string.
    MediaDate,
    /// Total duration in engine ticks.
    MediaDuration,
    /// Total file size in bytes.
    MediaFileSize,
    /// Bitrate in bits per second.
    MediaBitrate,
    /// File extension of the source URI.
    MediaFileExtension,
    /// Codec-specific configuration bytes.
    MediaCodecConfig,
    /// Current byte position inside the source.
    MediaPosition,
    /// Audio channel count.
    AudioChannels,
    /// Audio channel layout.
    AudioChannelLayout,
    /// Audio sample rate in Hz.
    AudioSampleRate,
    /// Audio sample format.
    AudioSampleFormat,
    /// Samples per encoded frame.
    AudioSamplePerFrame,
    /// MPEG audio version.
    AudioMpegVersion,
    /// MPEG audio layer.
    AudioMpegLayer,
    /// AAC profile.
    AudioAacProfile,
    /// AAC level.
    AudioAacLevel,
    /// AAC stream packaging format.
    AudioAacStreamFormat,
    /// Video frame width in pixels.
    VideoWidth,
    /// Video frame height in pixels.
    VideoHeight,
    /// Video pixel format.
    VideoPixelFormat,
    /// Video frame rate in frames per second.
    VideoFrameRate,
    /// Render surface handle.
    VideoSurface,
    /// Maximum number of surfaces a video sink may hold.
    VideoMaxSurfaceNum,
}

/// Audio sample formats understood across the plugin boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AudioSampleFormat {
    U8,
    S8,
    S16,
    S16P,
    S24,
    S32,
    S32P,
    F32,
    F32P,
    F64,
}

/// Audio channel layouts understood across the plugin boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AudioChannelLayout {
    Mono,
    Stereo,
    Surround,
    Quad,
    Ch5Point1,
    Ch7Point1,
}

/// AAC profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AudioAacProfile {
    Lc,
    He,
    HeV2,
}

/// AAC stream packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AudioAacStreamFormat {
    Raw,
    Adts,
    Adif,
}

/// Video pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum VideoPixelFormat {
    Unknown,
    Yuv420P,
    Nv12,
    Nv21,
    Rgba,
}

/// A typed tag value.
#[derive(Clone)]
pub enum TagValue {
    /// UTF-8 string value.
    String(String),
    /// Unsigned 32-bit value.
    U32(u32),
    /// Signed 64-bit value (durations, bitrates).
    I64(i64),
    /// Unsigned 64-bit value (sizes, positions).
    U64(u64),
    /// Opaque byte payload (codec config).
    Bytes(Vec<u8>),
    /// Audio sample format.
    SampleFormat(AudioSampleFormat),
    /// Audio channel layout.
    ChannelLayout(AudioChannelLayout),
    /// AAC profile.
    AacProfile(AudioAacProfile),
    /// AAC stream packaging.
    AacStreamFormat(AudioAacStreamFormat),
    /// Video pixel format.
    PixelFormat(VideoPixelFormat),
    /// Opaque render surface handle.
    Surface(u64),
    /// Buffer allocator handed from one plugin to another.
    Allocator(Arc<dyn BufferAllocator>),
}

impl std::fmt::Debug for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::String(v) => write!(f, "String({:?})", v),
            TagValue::U32(v) => write!(f, "U32({})", v),
            TagValue::I64(v) => write!(f, "I64({})", v),
            TagValue::U64(v) => write!(f, "U64({})", v),
            TagValue::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            TagValue::SampleFormat(v) => write!(f, "SampleFormat({:?})", v),
            TagValue::ChannelLayout(v) => write!(f, "ChannelLayout({:?})", v),
            TagValue::AacProfile(v) => write!(f, "AacProfile({:?})", v),
            TagValue::AacStreamFormat(v) => write!(f, "AacStreamFormat({:?})", v),
            TagValue::PixelFormat(v) => write!(f, "PixelFormat({:?})", v),
            TagValue::Surface(v) => write!(f, "Surface({:#x})", v),
            TagValue::Allocator(_) => write!(f, "Allocator(..)"),
        }
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TagValue::String(a), TagValue::String(b)) => a == b,
            (TagValue::U32(a), TagValue::U32(b)) => a == b,
            (TagValue::I64(a), TagValue::I64(b)) => a == b,
            (TagValue::U64(a), TagValue::U64(b)) => a == b,
            (TagValue::Bytes(a), TagValue::Bytes(b)) => a == b,
            (TagValue::SampleFormat(a), TagValue::SampleFormat(b)) => a == b,
            (TagValue::ChannelLayout(a), TagValue::ChannelLayout(b)) => a == b,
            (TagValue::AacProfile(a), TagValue::AacProfile(b)) => a == b,
            (TagValue::AacStreamFormat(a), TagValue::AacStreamFormat(b)) => a == b,
            (TagValue::PixelFormat(a), TagValue::PixelFormat(b)) => a == b,
            (TagValue::Surface(a), TagValue::Surface(b)) => a == b,
            (TagValue::Allocator(a), TagValue::Allocator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl TagValue {
    /// Human-readable type name, matching the descriptor table.
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::String(_) => "string",
            TagValue::U32(_) => "u32",
            TagValue::I64(_) => "i64",
            TagValue::U64(_) => "u64",
            TagValue::Bytes(_) => "bytes",
            TagValue::SampleFormat(_) => "AudioSampleFormat",
            TagValue::ChannelLayout(_) => "AudioChannelLayout",
            TagValue::AacProfile(_) => "AudioAacProfile",
            TagValue::AacStreamFormat(_) => "AudioAacStreamFormat",
            TagValue::PixelFormat(_) => "VideoPixelFormat",
            TagValue::Surface(_) => "surface",
            TagValue::Allocator(_) => "allocator",
        }
    }

    /// Borrow as `&str` when the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Copy out a `u32` when the value holds one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            TagValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Copy out an `i64` when the value holds one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Copy out a `u64` when the value holds one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::U64(v) => Some(*v),
            _ => None,
        }
    }
}

/// One descriptor table entry.
#[derive(Debug, Clone, Copy)]
pub struct TagDescriptor {
    /// The tag this entry describes.
    pub tag: Tag,
    /// Symbolic name used in logs and diagnostics.
    pub name: &'static str,
    /// Human-readable type name of the expected value.
    pub type_name: &'static str,
}

/// The full descriptor table, one entry per recognized tag.
pub const TAG_DESCRIPTORS: &[TagDescriptor] = &[
    TagDescriptor { tag: Tag::Mime, name: "mime", type_name: "string" },
    TagDescriptor { tag: Tag::TrackId, name: "track_id", type_name: "u32" },
    TagDescriptor { tag: Tag::RequiredOutBufferCnt, name: "req_out_buf_cnt", type_name: "u32" },
    TagDescriptor { tag: Tag::BufferAllocator, name: "buf_allocator", type_name: "allocator" },
    TagDescriptor { tag: Tag::BufferingSize, name: "buffering_size", type_name: "u32" },
    TagDescriptor { tag: Tag::WaterlineHigh, name: "waterline_h", type_name: "u32" },
    TagDescriptor { tag: Tag::WaterlineLow, name: "waterline_l", type_name: "u32" },
    TagDescriptor { tag: Tag::MediaTitle, name: "title", type_name: "string" },
    TagDescriptor { tag: Tag::MediaArtist, name: "artist", type_name: "string" },
    TagDescriptor { tag: Tag::MediaAlbum, name: "album", type_name: "string" },
    TagDescriptor { tag: Tag::MediaDate, name: "date", type_name: "string" },
    TagDescriptor { tag: Tag::MediaDuration, name: "duration", type_name: "i64" },
    TagDescriptor { tag: Tag::MediaFileSize, name: "file_size", type_name: "u64" },
    TagDescriptor { tag: Tag::MediaBitrate, name: "bit_rate", type_name: "i64" },
    TagDescriptor { tag: Tag::MediaFileExtension, name: "file_ext", type_name: "string" },
    TagDescriptor { tag: Tag::MediaCodecConfig, name: "codec_config", type_name: "bytes" },
    TagDescriptor { tag: Tag::MediaPosition, name: "position", type_name: "u64" },
    TagDescriptor { tag: Tag::AudioChannels, name: "channels", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioChannelLayout, name: "channel_layout", type_name: "AudioChannelLayout" },
    TagDescriptor { tag: Tag::AudioSampleRate, name: "sample_rate", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioSampleFormat, name: "sample_fmt", type_name: "AudioSampleFormat" },
    TagDescriptor { tag: Tag::AudioSamplePerFrame, name: "sample_per_frame", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioMpegVersion, name: "ad_mpeg_ver", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioMpegLayer, name: "ad_mpeg_layer", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioAacProfile, name: "aac_profile", type_name: "AudioAacProfile" },
    TagDescriptor { tag: Tag::AudioAacLevel, name: "aac_level", type_name: "u32" },
    TagDescriptor { tag: Tag::AudioAacStreamFormat, name: "aac_stm_fmt", type_name: "AudioAacStreamFormat" },
    TagDescriptor { tag: Tag::VideoWidth, name: "vd_w", type_name: "u32" },
    TagDescriptor { tag: Tag::VideoHeight, name: "vd_h", type_name: "u32" },
    TagDescriptor { tag: Tag::VideoPixelFormat, name: "pixel_fmt", type_name: "VideoPixelFormat" },
    TagDescriptor { tag: Tag::VideoFrameRate, name: "frame_rate", type_name: "u32" },
    TagDescriptor { tag: Tag::VideoSurface, name: "surface", type_name: "surface" },
    TagDescriptor { tag: Tag::VideoMaxSurfaceNum, name: "surface_num", type_name: "u32" },
];

/// Look up the descriptor for a tag.
pub fn tag_descriptor(tag: Tag) -> &'static TagDescriptor {
    // the table is total over Tag, so this always finds an entry
    TAG_DESCRIPTORS
        .iter()
        .find(|d| d.tag == tag)
        .expect("descriptor table covers every tag")
}

/// Default value for a tag, used for type comparison.
pub fn default_tag_value(tag: Tag) -> TagValue {
    match tag {
        Tag::Mime
        | Tag::MediaTitle
        | Tag::MediaArtist
        | Tag::MediaAlbum
        | Tag::MediaDate
        | Tag::MediaFileExtension => TagValue::String(String::new()),
        Tag::TrackId
        | Tag::RequiredOutBufferCnt
        | Tag::BufferingSize
        | Tag::WaterlineHigh
        | Tag::WaterlineLow
        | Tag::AudioChannels
        | Tag::AudioSampleRate
        | Tag::AudioSamplePerFrame
        | Tag::AudioMpegVersion
        | Tag::AudioMpegLayer
        | Tag::AudioAacLevel
        | Tag::VideoWidth
        | Tag::VideoHeight
        | Tag::VideoFrameRate
        | Tag::VideoMaxSurfaceNum => TagValue::U32(0),
        Tag::MediaDuration | Tag::MediaBitrate => TagValue::I64(0),
        Tag::MediaFileSize | Tag::MediaPosition => TagValue::U64(0),
        Tag::MediaCodecConfig => TagValue::Bytes(Vec::new()),
        Tag::AudioChannelLayout => TagValue::ChannelLayout(AudioChannelLayout::Mono),
        Tag::AudioSampleFormat => TagValue::SampleFormat(AudioSampleFormat::U8),
        Tag::AudioAacProfile => TagValue::AacProfile(AudioAacProfile::Lc),
        Tag::AudioAacStreamFormat => TagValue::AacStreamFormat(AudioAacStreamFormat::Raw),
        Tag::VideoPixelFormat => TagValue::PixelFormat(VideoPixelFormat::Unknown),
        Tag::VideoSurface => TagValue::Surface(0),
        Tag::BufferAllocator => TagValue::Allocator(crate::buffer::null_allocator()),
    }
}

/// Check a value against the declared type of a tag.
pub fn validate_tag_value(tag: Tag, value: &TagValue) -> bool {
    mem::discriminant(&default_tag_value(tag)) == mem::discriminant(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table_is_total() {
        // every descriptor's declared type name matches its default value
        for desc in TAG_DESCRIPTORS {
            let default = default_tag_value(desc.tag);
            assert_eq!(desc.type_name, default.type_name(), "tag {:?}", desc.tag);
        }
    }

    #[test]
    fn test_validate_matches_declared_type() {
        assert!(validate_tag_value(Tag::Mime, &TagValue::String("audio/mpeg".into())));
        assert!(validate_tag_value(Tag::AudioSampleRate, &TagValue::U32(44100)));
        assert!(validate_tag_value(Tag::MediaDuration, &TagValue::I64(1)));
        assert!(!validate_tag_value(Tag::AudioSampleRate, &TagValue::I64(44100)));
        assert!(!validate_tag_value(Tag::Mime, &TagValue::U32(0)));
        assert!(!validate_tag_value(
            Tag::AudioSampleFormat,
            &TagValue::ChannelLayout(AudioChannelLayout::Stereo)
        ));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(TagValue::U32(7).as_u32(), Some(7));
        assert_eq!(TagValue::U32(7).as_i64(), None);
        assert_eq!(TagValue::String("x".into()).as_str(), Some("x"));
    }
}
