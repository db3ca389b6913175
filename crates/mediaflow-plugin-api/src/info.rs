// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Plugin descriptors.

use serde::{Deserialize, Serialize};

use crate::caps::Capability;
use crate::source::ProtocolKind;

/// The kind of a plugin, deciding which trait it implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginType {
    /// Byte source (file, fd, http, stream).
    Source,
    /// Container demuxer.
    Demuxer,
    /// Decoder or encoder.
    Codec,
    /// Audio renderer.
    AudioSink,
    /// Video renderer.
    VideoSink,
    /// Container muxer.
    Muxer,
    /// Byte sink owning the output descriptor.
    OutputSink,
}

/// Static description of a registered plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Unique plugin name, e.g. `"ffmpeg.aac.dec"`.
    pub name: String,
    /// Plugin kind.
    pub plugin_type: PluginType,
    /// Selection priority; higher rank wins ties.
    pub rank: u32,
    /// Capabilities the plugin can consume.
    pub in_caps: Vec<Capability>,
    /// Capabilities the plugin can produce.
    pub out_caps: Vec<Capability>,
    /// Protocols a source plugin can open (empty for other kinds).
    pub protocols: Vec<ProtocolKind>,
}

impl PluginInfo {
    /// New descriptor with no capabilities.
    pub fn new(name: impl Into<String>, plugin_type: PluginType, rank: u32) -> Self {
        PluginInfo {
            name: name.into(),
            plugin_type,
            rank,
            in_caps: Vec::new(),
            out_caps: Vec::new(),
            protocols: Vec::new(),
        }
    }

    /// Builder: add an input capability.
    pub fn with_in_cap(mut self, capability: Capability) -> Self {
        self.in_caps.push(capability);
        self
    }

    /// Builder: add an output capability.
    pub fn with_out_cap(mut self, capability: Capability) -> Self {
        self.out_caps.push(capability);
        self
    }

    /// Builder: declare a supported protocol.
    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocols.push(protocol);
        self
    }
}
