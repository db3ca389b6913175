// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Concrete pipeline filters.

pub mod audio_capture;
pub mod audio_sink;
pub mod codec;
pub mod demuxer;
pub mod muxer;
pub mod output_sink;
pub mod source;
pub mod video_sink;

pub use audio_capture::AudioCaptureFilter;
pub use audio_sink::AudioSinkFilter;
pub use codec::{CodecFilter, CodecKind, CodecWorkMode};
pub use demuxer::DemuxerFilter;
pub use muxer::MuxerFilter;
pub use output_sink::OutputSinkFilter;
pub use source::SourceFilter;
pub use video_sink::VideoSinkFilter;
