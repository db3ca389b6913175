// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! MIME type constants used across the plugin boundary.

/// Unparsed container/byte-stream data as delivered by a source.
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Wildcard matching any MIME type.
pub const ANY: &str = "*";

/// Wildcard matching any audio MIME type.
pub const AUDIO_ANY: &str = "audio/*";
/// Raw PCM audio.
pub const AUDIO_RAW: &str = "audio/raw";
/// MPEG audio (MP3).
pub const AUDIO_MPEG: &str = "audio/mpeg";
/// AAC audio.
pub const AUDIO_AAC: &str = "audio/mp4a-latm";
/// WAV container audio.
pub const AUDIO_WAV: &str = "audio/wav";

/// Wildcard matching any video MIME type.
pub const VIDEO_ANY: &str = "video/*";
/// Raw video frames.
pub const VIDEO_RAW: &str = "video/raw";
/// H.264 video.
pub const VIDEO_H264: &str = "video/avc";

/// MP4 container.
pub const MEDIA_MP4: &str = "media/mp4";
