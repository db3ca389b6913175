// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Muxer filter (recorder path).
//!
//! Accepts one in-port per track, keyed by track id, serializes frames
//! through a [`MuxerPlugin`] chosen by output format, and pushes container
//! bytes to the output sink. The header is emitted lazily before the first
//! frame; the trailer once every track delivered its EOS.

use std::collections::HashMap;
use std::sync::Arc;

use mediaflow_plugin_api::{Buffer, Capability, MediaType, Meta, MuxerPlugin, PluginType};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::pipeline::filter::{Filter, FilterBase, FilterState, FilterType};
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::pipeline::settings::apply_allowed_parameters;
use crate::plugin::PluginRegistry;

/// Headroom for container framing around a payload.
const FRAME_MARGIN: usize = 256;
/// Capacity for header/trailer buffers.
const HEADER_CAPACITY: usize = 4096;

struct MuxState {
    /// in-port name -> plugin track id
    tracks: HashMap<String, u32>,
    /// in-port name -> end-of-stream seen
    finished: HashMap<String, bool>,
    header_written: bool,
    trailer_written: bool,
}

/// Serializes per-track frames into container bytes.
pub struct MuxerFilter {
    base: FilterBase,
    registry: Arc<PluginRegistry>,
    output_mime: RwLock<String>,
    plugin: RwLock<Option<Arc<dyn MuxerPlugin>>>,
    plugin_info: RwLock<Option<Arc<mediaflow_plugin_api::PluginInfo>>>,
    state: Mutex<MuxState>,
}

impl MuxerFilter {
    /// New muxer filter.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(MuxerFilter {
            base: FilterBase::new(name, FilterType::Muxer),
            registry,
            output_mime: RwLock::new(String::new()),
            plugin: RwLock::new(None),
            plugin_info: RwLock::new(None),
            state: Mutex::new(MuxState {
                tracks: HashMap::new(),
                finished: HashMap::new(),
                header_written: false,
                trailer_written: false,
            }),
        })
    }

    /// Select the container format; picks the muxer plugin.
    pub fn set_output_format(&self, mime: &str) -> Result<(), ErrorCode> {
        *self.output_mime.write() = mime.to_string();
        let wanted = Capability::new(mime);
        for info in self.registry.plugin_infos(PluginType::Muxer) {
            if !info.out_caps.iter().any(|c| c.compatible_with(&wanted)) {
                continue;
            }
            let plugin = self.registry.create_muxer(&info.name)?;
            translate_plugin_status(plugin.init())?;
            info!("muxer {} uses plugin {}", self.name(), info.name);
            *self.plugin.write() = Some(plugin);
            *self.plugin_info.write() = Some(info);
            return Ok(());
        }
        error!("no muxer plugin produces {}", mime);
        Err(ErrorCode::UnsupportedFormat)
    }

    fn plugin(&self) -> Option<Arc<dyn MuxerPlugin>> {
        self.plugin.read().clone()
    }

    fn push_serialized(&self, buffer: Buffer) -> Result<(), ErrorCode> {
        let ctx = self.base.context().ok_or(ErrorCode::InvalidState)?;
        ctx.push_downstream(PORT_NAME_DEFAULT, buffer)
    }
}

impl Filter for MuxerFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn in_ports(&self) -> Vec<String> {
        self.state.lock().tracks.keys().cloned().collect()
    }

    fn out_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn accepts_in_port(&self, _name: &str) -> bool {
        // in-ports appear as tracks are wired
        true
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        let Some(info) = self.plugin_info.read().clone() else {
            error!("muxer {} negotiated before set_output_format", self.name());
            return None;
        };
        info.in_caps
            .iter()
            .find_map(|in_cap| capability.intersect(in_cap))
    }

    fn configure(&self, in_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        apply_allowed_parameters(self.filter_type(), meta, |tag, value| {
            plugin.set_parameter(tag, value)
        })?;
        let track = plugin
            .add_track(meta)
            .map_err(|status| translate_plugin_status(status).unwrap_err())?;
        let mut state = self.state.lock();
        state.tracks.insert(in_port.to_string(), track);
        state.finished.insert(in_port.to_string(), false);
        let first_track = state.tracks.len() == 1;
        drop(state);
        debug!("muxer {} mapped port {} to track {}", self.name(), in_port, track);
        if first_track {
            translate_plugin_status(plugin.prepare())?;
            let ctx = self.base.context().ok_or(ErrorCode::InvalidState)?;
            let mime = self.output_mime.read().clone();
            if ctx
                .negotiate_downstream(PORT_NAME_DEFAULT, &Capability::new(mime.clone()))
                .is_none()
            {
                error!("output sink refused container format {}", mime);
                return Err(ErrorCode::UnsupportedFormat);
            }
            let mut downstream = Meta::new();
            let _ = downstream.set(
                mediaflow_plugin_api::Tag::Mime,
                mediaflow_plugin_api::TagValue::String(mime),
            );
            ctx.configure_downstream(PORT_NAME_DEFAULT, &downstream)?;
            self.base.set_state(FilterState::Ready);
            self.base.post_ready();
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();
        state.header_written = false;
        state.trailer_written = false;
        for finished in state.finished.values_mut() {
            *finished = false;
        }
        drop(state);
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }

    fn push_data(&self, in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        let mut state = self.state.lock();
        let Some(track) = state.tracks.get(in_port).copied() else {
            warn!("muxer {} got data on unknown port {}", self.name(), in_port);
            return Err(ErrorCode::NotExisted);
        };
        if !state.header_written {
            let mut header = Buffer::with_capacity(MediaType::Generic, HEADER_CAPACITY);
            translate_plugin_status(plugin.write_header(&mut header))?;
            state.header_written = true;
            drop(state);
            self.push_serialized(header)?;
            state = self.state.lock();
        }
        if buffer.is_eos() {
            *state.finished.entry(in_port.to_string()).or_insert(true) = true;
            let all_done = state.finished.values().all(|done| *done);
            if all_done && !state.trailer_written {
                state.trailer_written = true;
                drop(state);
                let mut trailer = Buffer::with_capacity(MediaType::Generic, HEADER_CAPACITY);
                translate_plugin_status(plugin.write_trailer(&mut trailer))?;
                self.push_serialized(trailer)?;
                info!("muxer {} finished all tracks", self.name());
                return self.push_serialized(Buffer::eos(MediaType::Generic));
            }
            return Ok(());
        }
        let mut out = Buffer::with_capacity(MediaType::Generic, buffer.size() + FRAME_MARGIN);
        translate_plugin_status(plugin.write_frame(track, &buffer, &mut out))?;
        drop(state);
        self.push_serialized(out)
    }
}

impl Drop for MuxerFilter {
    fn drop(&mut self) {
        if let Some(plugin) = self.plugin.read().clone() {
            let _ = plugin.deinit();
        }
    }
}
