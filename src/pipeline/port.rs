// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Port vocabulary.
//!
//! Ports are named attachment points on filters. They carry no owning
//! references: a link stores `(owner filter, port name)` pairs and every
//! data or negotiation call resolves its peer through the pipeline graph,
//! so the graph has no reference cycles.

use serde::{Deserialize, Serialize};

/// Name of the single port on filters that have only one.
pub const PORT_NAME_DEFAULT: &str = "default";

/// Port name prefix for audio tracks emitted by the demuxer.
pub const PORT_NAME_AUDIO_PREFIX: &str = "audio";

/// Port name prefix for video tracks emitted by the demuxer.
pub const PORT_NAME_VIDEO_PREFIX: &str = "video";

/// Direction of a port relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Receives data.
    In,
    /// Produces data.
    Out,
}

/// How data crosses a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkMode {
    /// Upstream pushes buffers into the downstream in-port.
    Push,
    /// Downstream pulls byte ranges from the upstream out-port.
    Pull,
}

/// Description of one dynamic port, reported through `PORT_ADDED`.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDesc {
    /// Port name; track ports are prefixed `audio`/`video`.
    pub name: String,
    /// Whether the track is already raw samples (no decoder needed).
    pub is_pcm: bool,
}

/// Payload of a `PORT_ADDED`/`PORT_REMOVE` filter callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    /// Direction of the described ports.
    pub direction: PortDirection,
    /// The ports being added or removed.
    pub ports: Vec<PortDesc>,
}
