// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Demuxer filter.
//!
//! Sniffs the container format, instantiates the winning demuxer plugin,
//! parses headers and grows one out-port per track (names prefixed
//! `audio`/`video`, reported through `PORT_ADDED`). Its worker task then
//! reads frames and routes each to the port of its track. Bytes arrive
//! either by pull from a seekable upstream or by push into a [`DataPacker`].

pub mod data_packer;
pub mod type_finder;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediaflow_plugin_api::{
    mime, Buffer, Capability, DataSource, DemuxerPlugin, MediaInfo, MediaType, Meta, SeekMode,
    Status, Tag,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::osal::Task;
use crate::pipeline::filter::{
    CallbackType, Filter, FilterBase, FilterContext, FilterState, FilterType,
};
use crate::pipeline::port::{
    PortDesc, PortDirection, PortInfo, WorkMode, PORT_NAME_AUDIO_PREFIX, PORT_NAME_DEFAULT,
    PORT_NAME_VIDEO_PREFIX,
};
use crate::plugin::PluginRegistry;

pub use data_packer::DataPacker;

const RETRY_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ParseState {
    Null = 0,
    ParseHeader = 1,
    ParseFrame = 2,
}

impl ParseState {
    fn from_u8(value: u8) -> ParseState {
        match value {
            1 => ParseState::ParseHeader,
            2 => ParseState::ParseFrame,
            _ => ParseState::Null,
        }
    }
}

#[derive(Debug, Clone)]
struct StreamTrack {
    stream_index: u32,
    port_name: String,
    media_type: MediaType,
}

struct PluginSlot {
    plugin: Option<Arc<dyn DemuxerPlugin>>,
    plugin_name: String,
}

/// Splits container bytes into per-track frames behind dynamic out-ports.
pub struct DemuxerFilter {
    base: FilterBase,
    weak: std::sync::Weak<DemuxerFilter>,
    registry: Arc<PluginRegistry>,
    slot: RwLock<PluginSlot>,
    task: Mutex<Option<Arc<Task>>>,
    packer: Arc<DataPacker>,
    parse_state: AtomicU8,
    work_mode: RwLock<WorkMode>,
    media_size: AtomicU64,
    push_offset: AtomicU64,
    media_info: RwLock<Option<MediaInfo>>,
    tracks: RwLock<Vec<StreamTrack>>,
}

impl DemuxerFilter {
    /// New demuxer filter using `registry` for sniffing and instantiation.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak| DemuxerFilter {
            base: FilterBase::new(name, FilterType::Demuxer),
            weak: weak.clone(),
            registry,
            slot: RwLock::new(PluginSlot {
                plugin: None,
                plugin_name: String::new(),
            }),
            task: Mutex::new(None),
            packer: Arc::new(DataPacker::new()),
            parse_state: AtomicU8::new(ParseState::Null as u8),
            work_mode: RwLock::new(WorkMode::Push),
            media_size: AtomicU64::new(0),
            push_offset: AtomicU64::new(0),
            media_info: RwLock::new(None),
            tracks: RwLock::new(Vec::new()),
        })
    }

    /// Container-level meta, available once headers parsed.
    pub fn global_meta(&self) -> Option<Meta> {
        self.media_info.read().as_ref().map(|i| i.global.clone())
    }

    /// Per-track metas, available once headers parsed.
    pub fn stream_metas(&self) -> Vec<Meta> {
        self.media_info
            .read()
            .as_ref()
            .map(|i| i.tracks.clone())
            .unwrap_or_default()
    }

    /// Seek the container to `time` engine ticks.
    pub fn seek_to(&self, time: i64, mode: SeekMode) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.seek_to(None, time, mode))?;
        // a stream parked at end-of-stream starts delivering again
        self.set_parse_state(ParseState::ParseFrame);
        if self.base.state() == FilterState::Running {
            if let Some(task) = self.task.lock().as_ref() {
                task.start();
            }
        }
        Ok(())
    }

    fn plugin(&self) -> Option<Arc<dyn DemuxerPlugin>> {
        self.slot.read().plugin.clone()
    }

    fn parse_state(&self) -> ParseState {
        ParseState::from_u8(self.parse_state.load(Ordering::Acquire))
    }

    fn set_parse_state(&self, state: ParseState) {
        self.parse_state.store(state as u8, Ordering::Release);
    }

    fn demuxer_loop(&self) {
        match self.parse_state() {
            ParseState::Null => std::thread::sleep(RETRY_SLEEP),
            ParseState::ParseHeader => self.parse_header(),
            ParseState::ParseFrame => self.parse_one_frame(),
        }
    }

    fn read_probe(&self) -> Option<Vec<u8>> {
        let mut probe = Buffer::with_capacity(MediaType::Generic, type_finder::PROBE_SIZE);
        match *self.work_mode.read() {
            WorkMode::Pull => {
                let ctx = self.base.context()?;
                match ctx.pull_upstream(
                    PORT_NAME_DEFAULT,
                    0,
                    type_finder::PROBE_SIZE,
                    &mut probe,
                ) {
                    Ok(()) => Some(probe.as_slice().to_vec()),
                    Err(ErrorCode::EndOfStream) => Some(probe.as_slice().to_vec()),
                    Err(_) => None,
                }
            }
            WorkMode::Push => {
                let want = type_finder::PROBE_SIZE.min(self.packer.end_offset() as usize);
                if want == 0 {
                    return None;
                }
                if want < type_finder::PROBE_SIZE && !self.packer.is_eos() {
                    return None;
                }
                self.packer
                    .peek_range(0, want, &mut probe)
                    .then(|| probe.as_slice().to_vec())
            }
        }
    }

    fn create_plugin(&self, name: &str) -> Result<Arc<dyn DemuxerPlugin>, ErrorCode> {
        let mut slot = self.slot.write();
        if let Some(existing) = slot.plugin.clone() {
            if slot.plugin_name == name && existing.reset().is_ok() {
                info!("reusing demuxer plugin {}", name);
                return Ok(existing);
            }
            if !existing.deinit().is_ok() {
                warn!("deinit of demuxer plugin {} failed", slot.plugin_name);
            }
        }
        let plugin = self.registry.create_demuxer(name)?;
        info!("created demuxer plugin {}", name);
        slot.plugin = Some(Arc::clone(&plugin));
        slot.plugin_name = name.to_string();
        Ok(plugin)
    }

    fn parse_header(&self) {
        let Some(probe) = self.read_probe() else {
            std::thread::sleep(RETRY_SLEEP);
            return;
        };
        let Some(plugin_name) = type_finder::find_media_type(&self.registry, &probe) else {
            error!("no demuxer recognizes the stream");
            self.set_parse_state(ParseState::Null);
            self.base.post_error(ErrorCode::UnsupportedFormat);
            return;
        };
        let plugin = match self.create_plugin(&plugin_name) {
            Ok(plugin) => plugin,
            Err(error) => {
                self.set_parse_state(ParseState::Null);
                self.base.post_error(error);
                return;
            }
        };
        if let Err(error) = translate_plugin_status(plugin.init()) {
            self.set_parse_state(ParseState::Null);
            self.base.post_error(error);
            return;
        }
        let data_source: Arc<dyn DataSource> = Arc::new(DemuxDataSource {
            mode: *self.work_mode.read(),
            packer: Arc::clone(&self.packer),
            ctx: self.base.context(),
            media_size: self.media_size.load(Ordering::Acquire),
        });
        if let Err(error) = translate_plugin_status(plugin.set_data_source(data_source)) {
            self.set_parse_state(ParseState::Null);
            self.base.post_error(error);
            return;
        }
        let media_info = match plugin.get_media_info() {
            Ok(info) => info,
            Err(Status::ErrorAgain) | Err(Status::ErrorNotEnoughData) => {
                // push mode: headers not fully buffered yet
                std::thread::sleep(RETRY_SLEEP);
                return;
            }
            Err(status) => {
                self.set_parse_state(ParseState::Null);
                self.base
                    .post_error(translate_plugin_status(status).unwrap_err());
                return;
            }
        };
        match self.prepare_streams(&media_info) {
            Ok(()) => {
                *self.media_info.write() = Some(media_info);
                self.set_parse_state(ParseState::ParseFrame);
                self.base.set_state(FilterState::Ready);
                self.base.post_ready();
                info!("demuxer {} ready, format {}", self.name(), plugin_name);
            }
            Err(error) => {
                self.set_parse_state(ParseState::Null);
                self.base.post_error(error);
            }
        }
    }

    fn prepare_streams(&self, media_info: &MediaInfo) -> Result<(), ErrorCode> {
        let ctx = self.base.context().ok_or(ErrorCode::InvalidState)?;
        let mut tracks = Vec::new();
        let mut descs = Vec::new();
        for (index, track_meta) in media_info.tracks.iter().enumerate() {
            let mime_type = track_meta.get_string(Tag::Mime).unwrap_or_default();
            let (prefix, media_type) = if mime_type.starts_with("audio/") {
                (PORT_NAME_AUDIO_PREFIX, MediaType::Audio)
            } else if mime_type.starts_with("video/") {
                (PORT_NAME_VIDEO_PREFIX, MediaType::Video)
            } else {
                warn!("track {} has unhandled mime {}", index, mime_type);
                continue;
            };
            let is_pcm = mime_type == mime::AUDIO_RAW || mime_type == mime::VIDEO_RAW;
            let port_name = format!("{}{}", prefix, index);
            tracks.push(StreamTrack {
                stream_index: index as u32,
                port_name: port_name.clone(),
                media_type,
            });
            descs.push(PortDesc {
                name: port_name,
                is_pcm,
            });
        }
        if tracks.is_empty() {
            return Err(ErrorCode::UnsupportedFormat);
        }
        let already_wired = {
            let current = self.tracks.read();
            current.len() == tracks.len()
                && current
                    .iter()
                    .zip(&tracks)
                    .all(|(a, b)| a.port_name == b.port_name)
        };
        *self.tracks.write() = tracks.clone();
        if !already_wired {
            ctx.notify_callback(
                CallbackType::PortAdded,
                &PortInfo {
                    direction: PortDirection::Out,
                    ports: descs,
                },
            )?;
        }
        // downstream chains exist now; negotiate and configure every track
        let duration = media_info.global.get_i64(Tag::MediaDuration);
        for track in &tracks {
            let track_meta = &media_info.tracks[track.stream_index as usize];
            let capability = track_meta.to_capability();
            if ctx
                .negotiate_downstream(&track.port_name, &capability)
                .is_none()
            {
                error!("negotiation failed for port {}", track.port_name);
                return Err(ErrorCode::UnsupportedFormat);
            }
            let mut merged = track_meta.clone();
            if let Some(duration) = duration {
                let _ = merged.set(Tag::MediaDuration, mediaflow_plugin_api::TagValue::I64(duration));
            }
            ctx.configure_downstream(&track.port_name, &merged)?;
        }
        Ok(())
    }

    fn parse_one_frame(&self) {
        let Some(plugin) = self.plugin() else {
            std::thread::sleep(RETRY_SLEEP);
            return;
        };
        let mut buffer = Buffer::new(MediaType::Generic);
        match plugin.read_frame(&mut buffer, 0) {
            Status::Ok => {
                let port_name = {
                    let tracks = self.tracks.read();
                    tracks
                        .iter()
                        .find(|t| t.stream_index == buffer.stream_index)
                        .map(|t| t.port_name.clone())
                };
                match (port_name, self.base.context()) {
                    (Some(port_name), Some(ctx)) => {
                        if let Err(error) = ctx.push_downstream(&port_name, buffer) {
                            debug!("frame dropped on port {}: {}", port_name, error);
                        }
                    }
                    _ => debug!("frame for unknown stream {}", buffer.stream_index),
                }
            }
            Status::EndOfStream => {
                self.send_eos_to_all_ports();
                if let Some(task) = self.task.lock().as_ref() {
                    // worker thread: degrades to an async pause
                    task.pause();
                }
            }
            Status::ErrorAgain | Status::ErrorNotEnoughData => {
                std::thread::sleep(RETRY_SLEEP);
            }
            status => {
                warn!("read_frame failed: {:?}", status);
                std::thread::sleep(RETRY_SLEEP);
            }
        }
    }

    fn send_eos_to_all_ports(&self) {
        info!("demuxer {} delivering end of stream", self.name());
        let Some(ctx) = self.base.context() else {
            return;
        };
        for track in self.tracks.read().iter() {
            let mut eos = Buffer::eos(track.media_type);
            eos.stream_index = track.stream_index;
            let _ = ctx.push_downstream(&track.port_name, eos);
        }
    }
}

impl Filter for DemuxerFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn in_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn out_ports(&self) -> Vec<String> {
        self.tracks.read().iter().map(|t| t.port_name.clone()).collect()
    }

    fn negotiate(&self, _in_port: &str, capability: &Capability) -> Option<Capability> {
        // any byte stream is acceptable; real negotiation happens per track
        Some(capability.clone())
    }

    fn configure(&self, _in_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        if let Some(size) = meta.get_u64(Tag::MediaFileSize) {
            self.media_size.store(size, Ordering::Release);
            *self.work_mode.write() = WorkMode::Pull;
        } else {
            *self.work_mode.write() = WorkMode::Push;
        }
        debug!(
            "demuxer {} configured, mode {:?}",
            self.name(),
            *self.work_mode.read()
        );
        Ok(())
    }

    fn prepare(&self) -> Result<(), ErrorCode> {
        self.base.set_state(FilterState::Preparing);
        self.set_parse_state(ParseState::ParseHeader);
        let mut task = self.task.lock();
        if task.is_none() {
            let weak = self.weak.clone();
            *task = Some(Task::new(format!("{}-loop", self.name()), move || {
                if let Some(filter) = weak.upgrade() {
                    filter.demuxer_loop();
                }
            }));
        }
        if let Some(task) = task.as_ref() {
            task.start();
        }
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.start())?;
        }
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
        self.set_parse_state(ParseState::Null);
        if let Some(task) = self.task.lock().as_ref() {
            task.stop();
        }
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.push_offset.store(0, Ordering::Release);
        self.packer.flush();
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }

    fn flush_start(&self) {
        if let Some(task) = self.task.lock().as_ref() {
            task.pause();
        }
        self.packer.flush();
    }

    fn flush_end(&self) {
        // the loop stays parked until seek_to repositions the plugin;
        // restarting here would deliver pre-seek frames
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        if buffer.is_eos() {
            self.packer.set_eos();
        }
        if buffer.size() > 0 {
            let offset = self
                .push_offset
                .fetch_add(buffer.size() as u64, Ordering::AcqRel);
            self.packer.push_at(offset, buffer.as_slice());
        }
        Ok(())
    }
}

struct DemuxDataSource {
    mode: WorkMode,
    packer: Arc<DataPacker>,
    ctx: Option<FilterContext>,
    media_size: u64,
}

impl DataSource for DemuxDataSource {
    fn read_at(&self, offset: u64, size: usize, buffer: &mut Buffer) -> Status {
        match self.mode {
            WorkMode::Pull => {
                let Some(ctx) = &self.ctx else {
                    return Status::ErrorInvalidState;
                };
                match ctx.pull_upstream(PORT_NAME_DEFAULT, offset, size, buffer) {
                    Ok(()) => Status::Ok,
                    Err(ErrorCode::EndOfStream) => Status::EndOfStream,
                    Err(ErrorCode::Again) => Status::ErrorAgain,
                    Err(_) => Status::ErrorUnknown,
                }
            }
            WorkMode::Push => {
                if self.packer.get_range(offset, size, buffer) {
                    Status::Ok
                } else if self.packer.is_eos() && offset >= self.packer.end_offset() {
                    Status::EndOfStream
                } else if self.packer.is_eos() {
                    // a short tail: serve what remains
                    let remaining = (self.packer.end_offset() - offset) as usize;
                    if remaining > 0 && self.packer.get_range(offset, remaining, buffer) {
                        Status::Ok
                    } else {
                        Status::EndOfStream
                    }
                } else {
                    Status::ErrorAgain
                }
            }
        }
    }

    fn size(&self) -> Option<u64> {
        match self.mode {
            WorkMode::Pull => (self.media_size > 0).then_some(self.media_size),
            WorkMode::Push => None,
        }
    }
}
