// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-filter allowed-parameter tables.
//!
//! During configuration a filter extracts only the tags its plugin kind is
//! allowed to see from the merged meta and forwards them one by one. The
//! type of each value was already checked against the descriptor table when
//! it entered the meta.

use mediaflow_plugin_api::{Meta, Status, Tag, TagValue};
use tracing::warn;

use crate::error::ErrorCode;
use crate::pipeline::filter::FilterType;

const AUDIO_COMMON: &[Tag] = &[
    Tag::Mime,
    Tag::AudioChannels,
    Tag::AudioChannelLayout,
    Tag::AudioSampleRate,
    Tag::AudioSampleFormat,
    Tag::AudioSamplePerFrame,
    Tag::MediaBitrate,
    Tag::MediaCodecConfig,
    Tag::AudioMpegVersion,
    Tag::AudioMpegLayer,
    Tag::AudioAacProfile,
    Tag::AudioAacLevel,
    Tag::AudioAacStreamFormat,
];

const VIDEO_COMMON: &[Tag] = &[
    Tag::Mime,
    Tag::VideoWidth,
    Tag::VideoHeight,
    Tag::VideoPixelFormat,
    Tag::VideoFrameRate,
    Tag::MediaBitrate,
    Tag::MediaCodecConfig,
];

const VIDEO_SINK: &[Tag] = &[
    Tag::Mime,
    Tag::VideoWidth,
    Tag::VideoHeight,
    Tag::VideoPixelFormat,
    Tag::VideoFrameRate,
    Tag::VideoSurface,
    Tag::VideoMaxSurfaceNum,
];

const MEDIA_SOURCE: &[Tag] = &[Tag::BufferingSize, Tag::WaterlineHigh, Tag::WaterlineLow];

const MUXER: &[Tag] = &[Tag::Mime, Tag::MediaDuration, Tag::MediaBitrate];

const OUTPUT_SINK: &[Tag] = &[Tag::Mime, Tag::MediaFileSize];

/// Tags a filter kind may forward to its plugin.
pub fn allowed_parameters(filter_type: FilterType) -> &'static [Tag] {
    match filter_type {
        FilterType::MediaSource => MEDIA_SOURCE,
        FilterType::Demuxer => &[Tag::Mime, Tag::MediaFileSize, Tag::MediaFileExtension],
        FilterType::AudioDecoder | FilterType::AudioEncoder | FilterType::AudioSink => AUDIO_COMMON,
        FilterType::VideoDecoder | FilterType::VideoEncoder => VIDEO_COMMON,
        FilterType::VideoSink => VIDEO_SINK,
        FilterType::Muxer => MUXER,
        FilterType::OutputSink => OUTPUT_SINK,
    }
}

/// Forward the allowed subset of `meta` through `set_parameter`.
///
/// Individual rejections are recoverable: they are logged and skipped, per
/// the error policy; only a type mismatch reported by the plugin is a bug
/// worth surfacing.
pub fn apply_allowed_parameters(
    filter_type: FilterType,
    meta: &Meta,
    mut set_parameter: impl FnMut(Tag, TagValue) -> Status,
) -> Result<(), ErrorCode> {
    for tag in allowed_parameters(filter_type) {
        let Some(value) = meta.get(*tag) else {
            continue;
        };
        match set_parameter(*tag, value.clone()) {
            Status::Ok | Status::ErrorUnimplemented => {}
            Status::ErrorMismatchedType => return Err(ErrorCode::InvalidParameterType),
            status => {
                warn!("set_parameter {:?} rejected: {:?}", tag, status);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_allowed_tags_forwarded() {
        let meta = Meta::new()
            .with(Tag::Mime, TagValue::String("audio/raw".into()))
            .with(Tag::AudioSampleRate, TagValue::U32(48000))
            .with(Tag::VideoWidth, TagValue::U32(640));
        let mut seen = Vec::new();
        apply_allowed_parameters(FilterType::AudioSink, &meta, |tag, _| {
            seen.push(tag);
            Status::Ok
        })
        .unwrap();
        assert!(seen.contains(&Tag::Mime));
        assert!(seen.contains(&Tag::AudioSampleRate));
        assert!(!seen.contains(&Tag::VideoWidth));
    }

    #[test]
    fn test_type_mismatch_surfaces() {
        let meta = Meta::new().with(Tag::AudioSampleRate, TagValue::U32(48000));
        let result = apply_allowed_parameters(FilterType::AudioSink, &meta, |_, _| {
            Status::ErrorMismatchedType
        });
        assert_eq!(result, Err(ErrorCode::InvalidParameterType));
    }
}
