// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Container format detection.
//!
//! Runs the registered demuxer sniffers over the first bytes of the stream,
//! highest rank first; the first sniffer that recognizes the prefix names
//! the demuxer plugin to instantiate.

use crate::plugin::PluginRegistry;

/// Bytes read from the head of the stream for sniffing.
pub const PROBE_SIZE: usize = 64;

/// Find the demuxer plugin for a byte prefix.
pub fn find_media_type(registry: &PluginRegistry, probe: &[u8]) -> Option<String> {
    registry.sniff(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::RegistryBuilder;
    use mediaflow_plugin_api::{mime, Capability, PluginInfo, PluginType};

    #[test]
    fn test_probe_selects_by_magic() {
        let registry = RegistryBuilder::new()
            .demuxer(
                PluginInfo::new("wav.demuxer", PluginType::Demuxer, 50)
                    .with_in_cap(Capability::new(mime::APPLICATION_OCTET_STREAM)),
                |data| data.starts_with(b"RIFF"),
                || unimplemented!(),
            )
            .build();
        assert_eq!(
            find_media_type(&registry, b"RIFF....WAVE"),
            Some("wav.demuxer".to_string())
        );
        assert_eq!(find_media_type(&registry, b"ID3..."), None);
    }
}
