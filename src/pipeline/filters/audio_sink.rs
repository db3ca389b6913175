// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Audio sink filter.
//!
//! Writes arriving sample buffers to an [`AudioSinkPlugin`] and reports the
//! render position upward. A buffer pushed while the filter is not running
//! blocks the pushing worker until playback starts, which is what holds the
//! pipeline back between `Prepare` and `Play`. The EOS flag is turned into
//! an `AudioComplete` event after a short drain grace period.

use std::sync::Arc;
use std::time::Duration;

use mediaflow_plugin_api::{
    AudioSinkPlugin, Buffer, BufferFlags, Capability, Meta, Tag,
};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::pipeline::event::EventKind;
use crate::pipeline::filter::{Filter, FilterBase, FilterState, FilterType};
use crate::pipeline::negotiate::find_available_plugins;
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::pipeline::settings::apply_allowed_parameters;
use crate::plugin::PluginRegistry;

/// Drain time granted to the device after the last buffer.
const EOS_GRACE: Duration = Duration::from_millis(60);

struct PluginSlot {
    plugin: Option<Arc<dyn AudioSinkPlugin>>,
    plugin_name: String,
}

struct Gate {
    flushing: bool,
}

/// Terminal audio node.
pub struct AudioSinkFilter {
    base: FilterBase,
    registry: Arc<PluginRegistry>,
    slot: RwLock<PluginSlot>,
    gate: Mutex<Gate>,
    gate_cond: Condvar,
    pending_volume: Mutex<Option<f32>>,
}

impl AudioSinkFilter {
    /// New audio sink filter.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(AudioSinkFilter {
            base: FilterBase::new(name, FilterType::AudioSink),
            registry,
            slot: RwLock::new(PluginSlot {
                plugin: None,
                plugin_name: String::new(),
            }),
            gate: Mutex::new(Gate { flushing: false }),
            gate_cond: Condvar::new(),
            pending_volume: Mutex::new(None),
        })
    }

    /// Set the output volume, already normalized to `[0.0, 1.0]`.
    pub fn set_volume(&self, volume: f32) -> Result<(), ErrorCode> {
        match self.plugin() {
            Some(plugin) => {
                info!("audio sink volume {:.3}", volume);
                translate_plugin_status(plugin.set_volume(volume))
            }
            None => {
                *self.pending_volume.lock() = Some(volume);
                Ok(())
            }
        }
    }

    /// Render latency reported by the plugin, in engine ticks.
    pub fn latency(&self) -> i64 {
        self.plugin().map_or(0, |p| p.get_latency())
    }

    fn plugin(&self) -> Option<Arc<dyn AudioSinkPlugin>> {
        self.slot.read().plugin.clone()
    }

    fn wake_gate(&self) {
        self.gate_cond.notify_all();
    }

    /// Block the pushing worker until the sink may consume, returning false
    /// when the buffer should be dropped instead.
    fn wait_until_consumable(&self) -> bool {
        let mut gate = self.gate.lock();
        loop {
            if gate.flushing || self.base.state() == FilterState::Initialized {
                return false;
            }
            if self.base.state() == FilterState::Running {
                return true;
            }
            self.gate_cond.wait(&mut gate);
        }
    }
}

impl Filter for AudioSinkFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn in_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        let candidates = find_available_plugins(
            &self.registry,
            mediaflow_plugin_api::PluginType::AudioSink,
            capability,
        );
        let Some(selected) = candidates.first() else {
            error!("no audio sink plugin accepts {:?}", capability.mime);
            return None;
        };
        // a sink that cannot state its sample format cannot be configured
        for in_cap in &selected.info.in_caps {
            if !in_cap.keys.contains_key(&Tag::AudioSampleFormat) {
                error!("audio sink {} lacks a sample format constraint", selected.info.name);
                return None;
            }
        }
        {
            let mut slot = self.slot.write();
            if let Some(existing) = slot.plugin.clone() {
                if slot.plugin_name == selected.info.name && existing.reset().is_ok() {
                    info!("reusing audio sink plugin {}", selected.info.name);
                    return Some(selected.negotiated_in.clone());
                }
                if !existing.deinit().is_ok() {
                    warn!("deinit of audio sink plugin {} failed", slot.plugin_name);
                }
            }
            let plugin = match self.registry.create_audio_sink(&selected.info.name) {
                Ok(plugin) => plugin,
                Err(error) => {
                    error!("cannot create audio sink {}: {}", selected.info.name, error);
                    return None;
                }
            };
            if translate_plugin_status(plugin.init()).is_err() {
                return None;
            }
            slot.plugin = Some(plugin);
            slot.plugin_name = selected.info.name.clone();
        }
        Some(selected.negotiated_in.clone())
    }

    fn configure(&self, _in_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        apply_allowed_parameters(self.filter_type(), meta, |tag, value| {
            plugin.set_parameter(tag, value)
        })?;
        translate_plugin_status(plugin.prepare())?;
        self.base.set_state(FilterState::Ready);
        self.base.post_ready();
        debug!("audio sink {} ready", self.name());
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        if let Some(volume) = self.pending_volume.lock().take() {
            let _ = plugin.set_volume(volume);
        }
        self.base.set_state(FilterState::Running);
        self.wake_gate();
        Ok(())
    }

    fn pause(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.pause())?;
        }
        self.base.set_state(FilterState::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.resume())?;
        }
        self.base.set_state(FilterState::Running);
        self.wake_gate();
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.gate.lock().flushing = false;
        self.base.set_state(FilterState::Initialized);
        self.wake_gate();
        Ok(())
    }

    fn flush_start(&self) {
        self.gate.lock().flushing = true;
        self.wake_gate();
        if let Some(plugin) = self.plugin() {
            let _ = plugin.flush();
        }
    }

    fn flush_end(&self) {
        self.gate.lock().flushing = false;
        self.wake_gate();
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        if !self.wait_until_consumable() {
            debug!("audio sink dropping buffer while not consuming");
            return Ok(());
        }
        if buffer.flags.contains(BufferFlags::DISCARD) {
            return Ok(());
        }
        if buffer.is_eos() {
            info!("audio sink {} reached end of stream", self.name());
            std::thread::sleep(EOS_GRACE);
            self.base.post_event(EventKind::AudioComplete);
            return Ok(());
        }
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        if let Err(error) = translate_plugin_status(plugin.write(&buffer)) {
            if error == ErrorCode::Again {
                warn!("audio sink device busy, sample dropped");
                return Ok(());
            }
            self.base.post_error(error);
            return Err(error);
        }
        self.base.post_event(EventKind::AudioProgress(buffer.pts));
        Ok(())
    }
}

impl Drop for AudioSinkFilter {
    fn drop(&mut self) {
        if let Some(plugin) = self.slot.read().plugin.clone() {
            let _ = plugin.stop();
            let _ = plugin.deinit();
        }
    }
}
