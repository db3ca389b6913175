// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Output sink filter (recorder path).
//!
//! Terminal node of the recording pipeline: owns the [`OutputSinkPlugin`]
//! that holds the destination file descriptor and appends the container
//! bytes the muxer produces.

use std::sync::Arc;

use mediaflow_plugin_api::{Buffer, Capability, Meta, OutputSinkPlugin, PluginType};
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::pipeline::event::EventKind;
use crate::pipeline::filter::{Filter, FilterBase, FilterState, FilterType};
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::pipeline::settings::apply_allowed_parameters;
use crate::plugin::PluginRegistry;

/// Terminal byte sink of the recording pipeline.
pub struct OutputSinkFilter {
    base: FilterBase,
    registry: Arc<PluginRegistry>,
    plugin: RwLock<Option<Arc<dyn OutputSinkPlugin>>>,
    fd: RwLock<Option<i32>>,
}

impl OutputSinkFilter {
    /// New output sink filter.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(OutputSinkFilter {
            base: FilterBase::new(name, FilterType::OutputSink),
            registry,
            plugin: RwLock::new(None),
            fd: RwLock::new(None),
        })
    }

    /// Attach the destination descriptor.
    pub fn set_fd(&self, fd: i32) -> Result<(), ErrorCode> {
        *self.fd.write() = Some(fd);
        if let Some(plugin) = self.plugin.read().clone() {
            translate_plugin_status(plugin.set_fd(fd))?;
        }
        Ok(())
    }

    fn plugin(&self) -> Option<Arc<dyn OutputSinkPlugin>> {
        self.plugin.read().clone()
    }
}

impl Filter for OutputSinkFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn in_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        if self.plugin.read().is_some() {
            return Some(capability.clone());
        }
        for info in self.registry.plugin_infos(PluginType::OutputSink) {
            let Some(accepted) = info
                .in_caps
                .iter()
                .find_map(|in_cap| capability.intersect(in_cap))
            else {
                continue;
            };
            let plugin = match self.registry.create_output_sink(&info.name) {
                Ok(plugin) => plugin,
                Err(error) => {
                    error!("cannot create output sink {}: {}", info.name, error);
                    return None;
                }
            };
            if translate_plugin_status(plugin.init()).is_err() {
                return None;
            }
            if let Some(fd) = *self.fd.read() {
                if translate_plugin_status(plugin.set_fd(fd)).is_err() {
                    return None;
                }
            }
            info!("output sink {} uses plugin {}", self.name(), info.name);
            *self.plugin.write() = Some(plugin);
            return Some(accepted);
        }
        error!("no output sink plugin accepts {:?}", capability.mime);
        None
    }

    fn configure(&self, _in_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        apply_allowed_parameters(self.filter_type(), meta, |tag, value| {
            plugin.set_parameter(tag, value)
        })?;
        translate_plugin_status(plugin.prepare())?;
        self.base.set_state(FilterState::Ready);
        self.base.post_ready();
        debug!("output sink {} ready", self.name());
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        if buffer.is_eos() {
            info!("output sink {} wrote the whole container", self.name());
            self.base.post_event(EventKind::OutputComplete);
            return Ok(());
        }
        let plugin = self.plugin().ok_or(ErrorCode::InvalidState)?;
        translate_plugin_status(plugin.write(&buffer))
    }
}

impl Drop for OutputSinkFilter {
    fn drop(&mut self) {
        if let Some(plugin) = self.plugin.read().clone() {
            let _ = plugin.deinit();
        }
    }
}
