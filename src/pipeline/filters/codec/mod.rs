// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Codec filter: decoders and encoders.
//!
//! The filter negotiates a codec plugin between its upstream capability and
//! whatever its downstream accepts, then pumps buffers through the plugin in
//! either async mode (three workers, back-pressure on `ERROR_AGAIN`) or sync
//! mode (one worker).

pub mod async_mode;
pub mod sync_mode;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mediaflow_plugin_api::{Buffer, Capability, CodecPlugin, Meta, MediaType, Tag};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::osal::Task;
use crate::pipeline::filter::{Filter, FilterBase, FilterContext, FilterState, FilterType};
use crate::pipeline::negotiate::find_available_plugins;
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::pipeline::settings::apply_allowed_parameters;
use crate::plugin::PluginRegistry;
use crate::util::BufferPool;

use async_mode::{CodecCallback, CodecShared};

/// Output buffers kept when the plugin does not say how many it needs.
const DEFAULT_OUT_BUFFER_CNT: u32 = 8;
/// Output buffer payload size when the meta gives no better estimate.
const DEFAULT_OUT_BUFFER_SIZE: usize = 16 * 1024;

/// What the codec transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Compressed audio in, samples out.
    AudioDecoder,
    /// Compressed video in, frames out.
    VideoDecoder,
    /// Samples in, compressed audio out.
    AudioEncoder,
    /// Frames in, compressed video out.
    VideoEncoder,
}

impl CodecKind {
    fn filter_type(self) -> FilterType {
        match self {
            CodecKind::AudioDecoder => FilterType::AudioDecoder,
            CodecKind::VideoDecoder => FilterType::VideoDecoder,
            CodecKind::AudioEncoder => FilterType::AudioEncoder,
            CodecKind::VideoEncoder => FilterType::VideoEncoder,
        }
    }

    fn media_type(self) -> MediaType {
        match self {
            CodecKind::AudioDecoder | CodecKind::AudioEncoder => MediaType::Audio,
            CodecKind::VideoDecoder | CodecKind::VideoEncoder => MediaType::Video,
        }
    }
}

/// Threading strategy of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecWorkMode {
    /// One worker drives input, output and delivery in order.
    Sync,
    /// Dedicated workers for input, output supply and delivery.
    Async,
}

struct NegotiatedCaps {
    plugin_name: String,
    negotiated_in: Capability,
    negotiated_out: Capability,
}

struct CodecTasks {
    handle: Option<Arc<Task>>,
    decode: Option<Arc<Task>>,
    finish: Option<Arc<Task>>,
}

/// Decoder/encoder node pumping buffers through a [`CodecPlugin`].
pub struct CodecFilter {
    base: FilterBase,
    registry: Arc<PluginRegistry>,
    kind: CodecKind,
    work_mode: CodecWorkMode,
    shared: Arc<CodecShared>,
    negotiated: RwLock<Option<NegotiatedCaps>>,
    tasks: Mutex<CodecTasks>,
}

impl CodecFilter {
    /// New codec filter of the given kind and pump mode.
    pub fn new(
        name: impl Into<String>,
        kind: CodecKind,
        work_mode: CodecWorkMode,
        registry: Arc<PluginRegistry>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new(CodecFilter {
            shared: CodecShared::new(name.clone()),
            base: FilterBase::new(name, kind.filter_type()),
            registry,
            kind,
            work_mode,
            negotiated: RwLock::new(None),
            tasks: Mutex::new(CodecTasks {
                handle: None,
                decode: None,
                finish: None,
            }),
        })
    }

    /// The pump mode this filter was built with.
    pub fn work_mode(&self) -> CodecWorkMode {
        self.work_mode
    }

    #[cfg(test)]
    pub(crate) fn shared_for_test(&self) -> &Arc<CodecShared> {
        &self.shared
    }

    fn adopt_plugin(&self, name: &str) -> Result<Arc<dyn CodecPlugin>, ErrorCode> {
        let mut slot = self.shared.plugin.write();
        if let Some(existing) = slot.clone() {
            let negotiated = self.negotiated.read();
            let same_name = negotiated
                .as_ref()
                .map(|n| n.plugin_name == name)
                .unwrap_or(false);
            if same_name && existing.reset().is_ok() {
                info!("reusing codec plugin {}", name);
                return Ok(existing);
            }
            if !existing.deinit().is_ok() {
                warn!("deinit of previous codec plugin failed");
            }
        }
        let plugin = self.registry.create_codec(name)?;
        info!("created codec plugin {}", name);
        translate_plugin_status(plugin.init())?;
        translate_plugin_status(plugin.set_data_callback(CodecCallback::new(&self.shared)))?;
        *slot = Some(Arc::clone(&plugin));
        Ok(plugin)
    }

    fn out_buffer_spec(&self, meta: &Meta) -> (u32, usize) {
        let count = self
            .shared
            .plugin()
            .and_then(|p| p.get_parameter(Tag::RequiredOutBufferCnt).ok())
            .and_then(|v| v.as_u32())
            .unwrap_or(DEFAULT_OUT_BUFFER_CNT);
        let size = match self.kind.media_type() {
            MediaType::Video => {
                let width = meta.get_u32(Tag::VideoWidth).unwrap_or(0) as usize;
                let height = meta.get_u32(Tag::VideoHeight).unwrap_or(0) as usize;
                let frame = width * height * 3 / 2;
                frame.max(DEFAULT_OUT_BUFFER_SIZE)
            }
            _ => DEFAULT_OUT_BUFFER_SIZE,
        };
        (count, size)
    }

    fn ensure_tasks(&self) {
        let mut tasks = self.tasks.lock();
        match self.work_mode {
            CodecWorkMode::Async => {
                if tasks.handle.is_none() {
                    let shared = Arc::clone(&self.shared);
                    tasks.handle = Some(Task::new(
                        format!("{}-handle-frame", self.name()),
                        move || shared.handle_frame(),
                    ));
                }
                if tasks.decode.is_none() {
                    let shared = Arc::clone(&self.shared);
                    tasks.decode = Some(Task::new(
                        format!("{}-decode-frame", self.name()),
                        move || shared.decode_frame(),
                    ));
                }
                if tasks.finish.is_none() {
                    let shared = Arc::clone(&self.shared);
                    tasks.finish = Some(Task::new(
                        format!("{}-finish-frame", self.name()),
                        move || shared.finish_frame(),
                    ));
                }
            }
            CodecWorkMode::Sync => {
                if tasks.handle.is_none() {
                    let shared = Arc::clone(&self.shared);
                    tasks.handle = Some(Task::new(format!("{}-pump", self.name()), move || {
                        sync_mode::pump_once(&shared)
                    }));
                }
            }
        }
    }

    fn for_each_task(&self, mut op: impl FnMut(&Arc<Task>)) {
        let tasks = self.tasks.lock();
        for task in [&tasks.handle, &tasks.decode, &tasks.finish]
            .into_iter()
            .flatten()
        {
            op(task);
        }
    }
}

impl Filter for CodecFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn init(&self, ctx: FilterContext) {
        *self.shared.ctx.write() = Some(ctx.clone());
        self.base.set_context(ctx);
        self.base.set_state(FilterState::Initialized);
    }

    fn in_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn out_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        let ctx = self.base.context()?;
        let candidates = find_available_plugins(
            &self.registry,
            mediaflow_plugin_api::PluginType::Codec,
            capability,
        );
        for candidate in candidates {
            for out_cap in &candidate.info.out_caps {
                let Some(accepted) = ctx.negotiate_downstream(PORT_NAME_DEFAULT, out_cap) else {
                    continue;
                };
                if let Err(error) = self.adopt_plugin(&candidate.info.name) {
                    error!("cannot adopt codec plugin {}: {}", candidate.info.name, error);
                    return None;
                }
                *self.negotiated.write() = Some(NegotiatedCaps {
                    plugin_name: candidate.info.name.clone(),
                    negotiated_in: candidate.negotiated_in.clone(),
                    negotiated_out: accepted,
                });
                debug!(
                    "codec {} negotiated plugin {}",
                    self.name(),
                    candidate.info.name
                );
                return Some(candidate.negotiated_in);
            }
        }
        error!("codec {} found no workable plugin", self.name());
        None
    }

    fn configure(&self, _in_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        let plugin = self.shared.plugin().ok_or(ErrorCode::InvalidState)?;
        let negotiated = self.negotiated.read();
        let negotiated = negotiated.as_ref().ok_or(ErrorCode::InvalidState)?;
        let mut merged = meta.clone();
        merged.update(&negotiated.negotiated_in.to_meta());
        apply_allowed_parameters(self.filter_type(), &merged, |tag, value| {
            plugin.set_parameter(tag, value)
        })?;
        translate_plugin_status(plugin.prepare())?;

        let (count, size) = self.out_buffer_spec(&merged);
        let pool = match plugin.get_allocator() {
            Some(allocator) => {
                BufferPool::with_allocator(self.kind.media_type(), count as usize, size, &allocator)
            }
            None => BufferPool::new(self.kind.media_type(), count as usize, size),
        };
        *self.shared.out_pool.write() = Some(pool);
        if !self.shared.primed.swap(true, Ordering::AcqRel) {
            // first fill primes hardware codec queues before start
            self.shared.queue_all_pool_buffers();
        }

        let mut downstream = negotiated.negotiated_out.to_meta();
        if let Some(duration) = meta.get_i64(Tag::MediaDuration) {
            let _ = downstream.set(Tag::MediaDuration, mediaflow_plugin_api::TagValue::I64(duration));
        }
        let ctx = self.base.context().ok_or(ErrorCode::InvalidState)?;
        ctx.configure_downstream(PORT_NAME_DEFAULT, &downstream)?;
        self.base.set_state(FilterState::Ready);
        self.base.post_ready();
        Ok(())
    }

    fn prepare(&self) -> Result<(), ErrorCode> {
        self.base.set_state(FilterState::Preparing);
        self.shared.in_queue.set_active(true);
        self.ensure_tasks();
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        self.shared.stopped.store(false, Ordering::Release);
        let plugin = self.shared.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        self.for_each_task(|task| task.start());
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn pause(&self) -> Result<(), ErrorCode> {
        // the pumps stay parked on their empty queues; only the state moves
        self.base.set_state(FilterState::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<(), ErrorCode> {
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(pool) = self.shared.out_pool.read().clone() {
            pool.set_active(false);
        }
        self.shared.in_queue.set_active(false);
        self.shared.release_backpressure();
        self.for_each_task(|task| task.stop());
        self.shared.clear_render_queue();
        if let Some(plugin) = self.shared.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.shared.primed.store(false, Ordering::Release);
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }

    fn flush_start(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.in_queue.set_active(false);
        self.shared.release_backpressure();
        if let Some(pool) = self.shared.out_pool.read().clone() {
            pool.set_active(false);
        }
        // async: a pump may be parked inside the sink until its flush opens
        self.for_each_task(|task| task.pause_async());
        self.shared.clear_render_queue();
        if let Some(plugin) = self.shared.plugin() {
            let _ = plugin.flush();
        }
    }

    fn flush_end(&self) {
        self.shared.stopped.store(false, Ordering::Release);
        self.shared.in_queue.set_active(true);
        if let Some(pool) = self.shared.out_pool.read().clone() {
            pool.set_active(true);
        }
        self.shared.queue_all_pool_buffers();
        self.for_each_task(|task| task.start());
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        if self.shared.stopped.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(5));
            return Ok(());
        }
        self.shared.in_queue.push(buffer);
        Ok(())
    }
}

impl Drop for CodecFilter {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.in_queue.set_active(false);
        self.shared.release_backpressure();
        if let Some(pool) = self.shared.out_pool.read().clone() {
            pool.set_active(false);
        }
        self.for_each_task(|task| task.stop());
        if let Some(plugin) = self.shared.plugin() {
            let _ = plugin.deinit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeCodecPlugin};
    use async_mode::CodecCallback;
    use mediaflow_plugin_api::CodecPlugin as _;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// A codec that rejects its first inputs with `ERROR_AGAIN` must park the
    /// input pump and retry after each output completion; the input is
    /// accepted exactly once.
    #[test]
    fn test_backpressure_parks_and_retries() {
        testing::init_logging();
        let registry = crate::plugin::RegistryBuilder::new().build();
        let filter = CodecFilter::new(
            "decoder",
            CodecKind::AudioDecoder,
            CodecWorkMode::Async,
            registry,
        );
        let shared = Arc::clone(filter.shared_for_test());
        let fake = FakeCodecPlugin::with_again(3);
        fake.set_data_callback(CodecCallback::new(&shared));
        *shared.plugin.write() = Some(Arc::clone(&fake) as Arc<dyn mediaflow_plugin_api::CodecPlugin>);
        *shared.out_pool.write() = Some(crate::util::BufferPool::new(MediaType::Audio, 4, 1024));
        filter.prepare().unwrap();
        filter.start().unwrap();

        let mut input = Buffer::with_capacity(MediaType::Audio, 16);
        input.memory_mut(0).write(&[7; 8]);
        filter.push_data(crate::pipeline::port::PORT_NAME_DEFAULT, input).unwrap();

        for expected in 1usize..=3 {
            assert!(testing::wait_until(Duration::from_secs(1), || {
                fake.input_attempts.load(Ordering::SeqCst) >= expected
            }));
            // simulate the plugin completing an output slot
            fake.emit_discard_output();
        }
        assert!(testing::wait_until(Duration::from_secs(1), || {
            fake.inputs_accepted.load(Ordering::SeqCst) == 1
        }));
        assert_eq!(fake.input_attempts.load(Ordering::SeqCst), 4);
        filter.stop().unwrap();
    }

    #[test]
    fn test_sync_mode_pumps_a_frame_through() {
        testing::init_logging();
        let registry = crate::plugin::RegistryBuilder::new().build();
        let filter = CodecFilter::new(
            "encoder",
            CodecKind::AudioEncoder,
            CodecWorkMode::Sync,
            registry,
        );
        let shared = Arc::clone(filter.shared_for_test());
        let fake = FakeCodecPlugin::new();
        fake.set_data_callback(CodecCallback::new(&shared));
        *shared.plugin.write() = Some(Arc::clone(&fake) as Arc<dyn mediaflow_plugin_api::CodecPlugin>);
        *shared.out_pool.write() = Some(crate::util::BufferPool::new(MediaType::Audio, 2, 1024));
        filter.prepare().unwrap();
        filter.start().unwrap();

        let mut input = Buffer::with_capacity(MediaType::Audio, 16);
        input.memory_mut(0).write(&[1, 2, 3]);
        input.pts = 42;
        filter.push_data(crate::pipeline::port::PORT_NAME_DEFAULT, input).unwrap();

        assert!(testing::wait_until(Duration::from_secs(1), || {
            fake.inputs_accepted.load(Ordering::SeqCst) == 1
        }));
        filter.stop().unwrap();
    }
}
