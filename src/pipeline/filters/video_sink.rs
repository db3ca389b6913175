// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Video sink filter.
//!
//! Like the audio sink, but paces frame delivery on pts against a wall-clock
//! anchor taken at the first frame after start or flush.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mediaflow_plugin_api::{
    time::HST_MSECOND, Buffer, BufferFlags, Capability, Meta, VideoSinkPlugin,
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

const EOS_GRACE: Duration = Duration::from_millis(60);

struct PluginSlot {
    plugin: Option<Arc<dyn VideoSinkPlugin>>,
    plugin_name: String,
}

struct Gate {
    flushing: bool,
}

/// Media-clock anchor: wall time of the first rendered frame and its pts.
#[derive(Clone, Copy)]
struct Anchor {
    at: Instant,
    pts: i64,
}

/// Terminal video node.
pub struct VideoSinkFilter {
    base: FilterBase,
    registry: Arc<PluginRegistry>,
    slot: RwLock<PluginSlot>,
    gate: Mutex<Gate>,
    gate_cond: Condvar,
    anchor: Mutex<Option<Anchor>>,
}

impl VideoSinkFilter {
    /// New video sink filter.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(VideoSinkFilter {
            base: FilterBase::new(name, FilterType::VideoSink),
            registry,
            slot: RwLock::new(PluginSlot {
                plugin: None,
                plugin_name: String::new(),
            }),
            gate: Mutex::new(Gate { flushing: false }),
            gate_cond: Condvar::new(),
            anchor: Mutex::new(None),
        })
    }

    fn plugin(&self) -> Option<Arc<dyn VideoSinkPlugin>> {
        self.slot.read().plugin.clone()
    }

    fn wake_gate(&self) {
        self.gate_cond.notify_all();
    }

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

    /// Hold the frame until its pts is due on the media clock.
    fn pace(&self, pts: i64) {
        if pts < 0 {
            return;
        }
        let anchor = {
            let mut guard = self.anchor.lock();
            match *guard {
                None => {
                    *guard = Some(Anchor {
                        at: Instant::now(),
                        pts,
                    });
                    return;
                }
                Some(anchor) => anchor,
            }
        };
        let due_ms = (pts - anchor.pts) / HST_MSECOND;
        if due_ms > 0 {
            let due = anchor.at + Duration::from_millis(due_ms as u64);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
    }
}

impl Filter for VideoSinkFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn in_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        let candidates = find_available_plugins(
            &self.registry,
            mediaflow_plugin_api::PluginType::VideoSink,
            capability,
        );
        let Some(selected) = candidates.first() else {
            error!("no video sink plugin accepts {:?}", capability.mime);
            return None;
        };
        {
            let mut slot = self.slot.write();
            if let Some(existing) = slot.plugin.clone() {
                if slot.plugin_name == selected.info.name && existing.reset().is_ok() {
                    info!("reusing video sink plugin {}", selected.info.name);
                    return Some(selected.negotiated_in.clone());
                }
                if !existing.deinit().is_ok() {
                    warn!("deinit of video sink plugin {} failed", slot.plugin_name);
                }
            }
            let plugin = match self.registry.create_video_sink(&selected.info.name) {
                Ok(plugin) => plugin,
                Err(error) => {
                    error!("cannot create video sink {}: {}", selected.info.name, error);
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
        debug!("video sink {} ready", self.name());
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        *self.anchor.lock() = None;
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
        // the anchor is stale after a pause; re-anchor on the next frame
        *self.anchor.lock() = None;
        self.base.set_state(FilterState::Running);
        self.wake_gate();
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.gate.lock().flushing = false;
        *self.anchor.lock() = None;
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
        *self.anchor.lock() = None;
    }

    fn flush_end(&self) {
        self.gate.lock().flushing = false;
        self.wake_gate();
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        if !self.wait_until_consumable() {
            debug!("video sink dropping frame while not consuming");
            return Ok(());
        }
        if buffer.flags.contains(BufferFlags::DISCARD) {
            return Ok(());
        }
        if buffer.is_eos() {
            info!("video sink {} reached end of stream", self.name());
            std::thread::sleep(EOS_GRACE);
            self.base.post_event(EventKind::VideoComplete);
            return Ok(());
        }
        self.pace(buffer.pts);
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        if let Err(error) = translate_plugin_status(plugin.write(&buffer)) {
            if error == ErrorCode::Again {
                warn!("video sink device busy, frame dropped");
                return Ok(());
            }
            self.base.post_error(error);
            return Err(error);
        }
        self.base.post_event(EventKind::VideoProgress(buffer.pts));
        Ok(())
    }
}

impl Drop for VideoSinkFilter {
    fn drop(&mut self) {
        if let Some(plugin) = self.slot.read().plugin.clone() {
            let _ = plugin.stop();
            let _ = plugin.deinit();
        }
    }
}
