// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Audio capture filter (recorder path).
//!
//! Head of the recording pipeline: owns a stream-protocol [`SourcePlugin`]
//! (microphone or loopback capture) and pushes fixed-size PCM chunks
//! downstream, stamping pts from the configured sample layout.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mediaflow_plugin_api::{
    mime, Buffer, MediaSource, MediaType, Meta, ProtocolKind, SourcePlugin, Tag, TagValue,
    time::HST_SECOND,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::osal::Task;
use crate::pipeline::filter::{Filter, FilterBase, FilterState, FilterType};
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::plugin::PluginRegistry;

/// PCM bytes pushed per capture chunk.
const CAPTURE_CHUNK: usize = 4096;

/// Captures PCM from a stream source plugin and feeds the encoder.
pub struct AudioCaptureFilter {
    base: FilterBase,
    weak: std::sync::Weak<AudioCaptureFilter>,
    registry: Arc<PluginRegistry>,
    plugin: RwLock<Option<Arc<dyn SourcePlugin>>>,
    task: Mutex<Option<Arc<Task>>>,
    audio_meta: RwLock<Meta>,
    /// Running pts of the next chunk, in engine ticks.
    position: AtomicI64,
}

impl AudioCaptureFilter {
    /// New capture filter.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak| AudioCaptureFilter {
            base: FilterBase::new(name, FilterType::MediaSource),
            weak: weak.clone(),
            registry,
            plugin: RwLock::new(None),
            task: Mutex::new(None),
            audio_meta: RwLock::new(
                Meta::new()
                    .with(Tag::Mime, TagValue::String(mime::AUDIO_RAW.into()))
                    .with(Tag::AudioSampleRate, TagValue::U32(44100))
                    .with(Tag::AudioChannels, TagValue::U32(2)),
            ),
            position: AtomicI64::new(0),
        })
    }

    /// Set the capture format (sample rate, channels, sample format).
    pub fn configure_audio(&self, meta: Meta) {
        let mut stored = self.audio_meta.write();
        stored.update(&meta);
    }

    fn plugin(&self) -> Option<Arc<dyn SourcePlugin>> {
        self.plugin.read().clone()
    }

    fn connect_plugin(&self) -> Result<Arc<dyn SourcePlugin>, ErrorCode> {
        if let Some(plugin) = self.plugin() {
            return Ok(plugin);
        }
        for info in self.registry.plugin_infos(mediaflow_plugin_api::PluginType::Source) {
            if !info.protocols.contains(&ProtocolKind::Stream) {
                continue;
            }
            let plugin = self.registry.create_source(&info.name)?;
            translate_plugin_status(plugin.init())?;
            translate_plugin_status(plugin.set_source(&MediaSource::Stream))?;
            info!("capture {} uses plugin {}", self.name(), info.name);
            *self.plugin.write() = Some(Arc::clone(&plugin));
            return Ok(plugin);
        }
        error!("no stream-capable source plugin registered");
        Err(ErrorCode::PluginNotFound)
    }

    /// Ticks one chunk covers under the configured layout.
    fn chunk_duration(&self) -> i64 {
        let meta = self.audio_meta.read();
        let rate = meta.get_u32(Tag::AudioSampleRate).unwrap_or(44100) as i64;
        let channels = meta.get_u32(Tag::AudioChannels).unwrap_or(2) as i64;
        let bytes_per_second = (rate * channels * 2).max(1);
        CAPTURE_CHUNK as i64 * HST_SECOND / bytes_per_second
    }

    fn capture_loop(&self) {
        let Some(plugin) = self.plugin() else {
            return;
        };
        let mut buffer = Buffer::with_capacity(MediaType::Audio, CAPTURE_CHUNK);
        match translate_plugin_status(plugin.read(&mut buffer, CAPTURE_CHUNK)) {
            Ok(()) => {
                let duration = self.chunk_duration();
                buffer.pts = self.position.fetch_add(duration, Ordering::AcqRel);
                buffer.duration = duration;
                if let Some(ctx) = self.base.context() {
                    let _ = ctx.push_downstream(PORT_NAME_DEFAULT, buffer);
                }
            }
            Err(ErrorCode::EndOfStream) => {
                debug!("capture source drained");
                self.deliver_eos();
                if let Some(task) = self.task.lock().as_ref() {
                    task.stop_async();
                }
            }
            Err(ErrorCode::Again) => {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            Err(error) => {
                self.base.post_error(error);
                if let Some(task) = self.task.lock().as_ref() {
                    task.stop_async();
                }
            }
        }
    }

    fn deliver_eos(&self) {
        if let Some(ctx) = self.base.context() {
            let _ = ctx.push_downstream(PORT_NAME_DEFAULT, Buffer::eos(MediaType::Audio));
        }
    }

    /// Stop capturing and flush an EOS marker downstream so the container
    /// can be finalized.
    pub fn finish(&self) {
        if let Some(task) = self.task.lock().as_ref() {
            task.stop();
        }
        self.deliver_eos();
    }
}

impl Filter for AudioCaptureFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn out_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn prepare(&self) -> Result<(), ErrorCode> {
        self.base.set_state(FilterState::Preparing);
        let plugin = self.connect_plugin()?;
        translate_plugin_status(plugin.prepare())?;
        let ctx = self.base.context().ok_or(ErrorCode::InvalidState)?;
        let meta = self.audio_meta.read().clone();
        let capability = meta.to_capability();
        if ctx
            .negotiate_downstream(PORT_NAME_DEFAULT, &capability)
            .is_none()
        {
            error!("encoder refused capture format");
            return Err(ErrorCode::UnsupportedFormat);
        }
        ctx.configure_downstream(PORT_NAME_DEFAULT, &meta)?;
        {
            let mut task = self.task.lock();
            if task.is_none() {
                let weak = self.weak.clone();
                *task = Some(Task::new(format!("{}-capture", self.name()), move || {
                    if let Some(filter) = weak.upgrade() {
                        filter.capture_loop();
                    }
                }));
            }
        }
        self.base.set_state(FilterState::Ready);
        self.base.post_ready();
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        self.position.store(0, Ordering::Release);
        if let Some(task) = self.task.lock().as_ref() {
            task.start();
        }
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn pause(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.task.lock().as_ref() {
            task.pause();
        }
        self.base.set_state(FilterState::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.task.lock().as_ref() {
            task.start();
        }
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.task.lock().as_ref() {
            task.stop();
        }
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }
}

impl Drop for AudioCaptureFilter {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
        if let Some(plugin) = self.plugin.read().clone() {
            let _ = plugin.deinit();
        }
    }
}
