// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Candidate plugin selection for negotiation.
//!
//! Given an upstream capability offer, list the plugins of a type that can
//! consume it, highest rank first. Within a plugin the first compatible
//! in-capability wins; these orderings are the negotiation tie-breaks.

use std::sync::Arc;

use mediaflow_plugin_api::{Capability, PluginInfo, PluginType};

use crate::plugin::PluginRegistry;

/// A plugin that can consume an upstream offer.
pub struct Candidate {
    /// The plugin descriptor.
    pub info: Arc<PluginInfo>,
    /// Intersection of the offer with the matched in-capability.
    pub negotiated_in: Capability,
}

/// Plugins of `plugin_type` compatible with `upstream`, rank order.
pub fn find_available_plugins(
    registry: &PluginRegistry,
    plugin_type: PluginType,
    upstream: &Capability,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for info in registry.plugin_infos(plugin_type) {
        if let Some(negotiated_in) = info
            .in_caps
            .iter()
            .find_map(|in_cap| upstream.intersect(in_cap))
        {
            candidates.push(Candidate {
                info,
                negotiated_in,
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::RegistryBuilder;
    use mediaflow_plugin_api::{mime, Tag, TagValue};

    fn sink_info(name: &str, rank: u32, mime_type: &str) -> PluginInfo {
        PluginInfo::new(name, PluginType::AudioSink, rank).with_in_cap(
            Capability::new(mime_type).with_list(
                Tag::AudioSampleRate,
                vec![TagValue::U32(44100), TagValue::U32(48000)],
            ),
        )
    }

    #[test]
    fn test_candidates_rank_ordered_and_filtered() {
        let registry = RegistryBuilder::new()
            .audio_sink(sink_info("sink.low", 10, mime::AUDIO_RAW), || {
                unimplemented!()
            })
            .audio_sink(sink_info("sink.high", 90, mime::AUDIO_RAW), || {
                unimplemented!()
            })
            .audio_sink(sink_info("sink.other", 50, mime::VIDEO_RAW), || {
                unimplemented!()
            })
            .build();
        let offer = Capability::new(mime::AUDIO_RAW)
            .with_fixed(Tag::AudioSampleRate, TagValue::U32(48000));
        let candidates = find_available_plugins(&registry, PluginType::AudioSink, &offer);
        let names: Vec<&str> = candidates.iter().map(|c| c.info.name.as_str()).collect();
        assert_eq!(names, vec!["sink.high", "sink.low"]);
        assert_eq!(
            candidates[0].negotiated_in.keys.get(&Tag::AudioSampleRate),
            Some(&mediaflow_plugin_api::CapValueSet::Fixed(TagValue::U32(48000)))
        );
    }
}
