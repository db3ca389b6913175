// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Media source filter.
//!
//! Owns a [`SourcePlugin`] chosen by protocol. A seekable source works in
//! pull mode: the demuxer calls [`SourceFilter::pull_data`] through its
//! in-port. An unseekable source works in push mode: a reader task reads
//! chunks and pushes them downstream, ending with an EOS-flagged buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use mediaflow_plugin_api::{
    mime, Buffer, MediaSource, MediaType, Meta, ProtocolKind, Tag, TagValue,
};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::error::{translate_plugin_status, ErrorCode};
use crate::osal::Task;
use crate::pipeline::filter::{Filter, FilterBase, FilterState, FilterType};
use crate::pipeline::port::{WorkMode, PORT_NAME_DEFAULT};
use crate::plugin::PluginRegistry;

/// Chunk size pushed per read in push mode.
const DEFAULT_READ_SIZE: usize = 4096;

fn fd_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^fd://(\d+)\?offset=(\d+)&size=(\d+)$").expect("fd uri regex")
    })
}

/// Parse an `fd://<n>?offset=<o>&size=<s>` URI.
pub fn parse_fd_uri(uri: &str) -> Option<MediaSource> {
    let caps = fd_uri_regex().captures(uri)?;
    Some(MediaSource::Fd {
        fd: caps[1].parse().ok()?,
        offset: caps[2].parse().ok()?,
        size: caps[3].parse().ok()?,
    })
}

struct PluginSlot {
    plugin: Option<Arc<dyn mediaflow_plugin_api::SourcePlugin>>,
    plugin_name: String,
}

/// The pipeline entry point: reads bytes from a source plugin.
pub struct SourceFilter {
    base: FilterBase,
    weak: std::sync::Weak<SourceFilter>,
    registry: Arc<PluginRegistry>,
    slot: RwLock<PluginSlot>,
    reader: Mutex<Option<Arc<Task>>>,
    seekable: AtomicBool,
    position: AtomicU64,
    read_size: AtomicUsize,
}

impl SourceFilter {
    /// New source filter using `registry` for plugin lookup.
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak| SourceFilter {
            base: FilterBase::new(name, FilterType::MediaSource),
            weak: weak.clone(),
            registry,
            slot: RwLock::new(PluginSlot {
                plugin: None,
                plugin_name: String::new(),
            }),
            reader: Mutex::new(None),
            seekable: AtomicBool::new(false),
            position: AtomicU64::new(0),
            read_size: AtomicUsize::new(DEFAULT_READ_SIZE),
        })
    }

    /// Attach a media source: find a plugin by protocol, initialize it and
    /// negotiate downstream.
    pub fn set_source(&self, source: MediaSource) -> Result<(), ErrorCode> {
        info!("set_source: {:?}", source);
        let source = self.normalize(source)?;
        let protocol = source.protocol().ok_or(ErrorCode::InvalidParameterValue)?;
        let plugin = self.find_plugin(protocol)?;
        translate_plugin_status(plugin.init())?;
        translate_plugin_status(plugin.set_source(&source))?;
        self.activate_mode(&plugin);
        self.negotiate_downstream(&source, &plugin)
    }

    /// Override the push-mode chunk size.
    pub fn set_buffer_size(&self, size: usize) {
        self.read_size.store(size.max(1), Ordering::Relaxed);
    }

    /// Whether the attached source supports seeking.
    pub fn is_seekable(&self) -> bool {
        self.seekable.load(Ordering::Acquire)
    }

    /// Work modes the source can serve.
    pub fn work_modes(&self) -> Vec<WorkMode> {
        if self.is_seekable() {
            vec![WorkMode::Push, WorkMode::Pull]
        } else {
            vec![WorkMode::Push]
        }
    }

    /// Total source size, when the plugin knows it.
    pub fn size(&self) -> Option<u64> {
        self.plugin()?.get_size()
    }

    fn normalize(&self, source: MediaSource) -> Result<MediaSource, ErrorCode> {
        match &source {
            MediaSource::Uri(uri) => {
                if uri.starts_with("fd://") {
                    return parse_fd_uri(uri).ok_or(ErrorCode::InvalidParameterValue);
                }
                if source.protocol() == Some(ProtocolKind::File) {
                    let path = mediaflow_plugin_api::source::split_scheme(uri)
                        .map_or(uri.as_str(), |(_, rest)| rest);
                    if !path.starts_with('/') {
                        let absolute = std::path::Path::new(path)
                            .canonicalize()
                            .map_err(|_| ErrorCode::NotExisted)?;
                        return Ok(MediaSource::Uri(format!(
                            "file://{}",
                            absolute.display()
                        )));
                    }
                }
                Ok(source)
            }
            _ => Ok(source),
        }
    }

    fn plugin(&self) -> Option<Arc<dyn mediaflow_plugin_api::SourcePlugin>> {
        self.slot.read().plugin.clone()
    }

    fn find_plugin(
        &self,
        protocol: ProtocolKind,
    ) -> Result<Arc<dyn mediaflow_plugin_api::SourcePlugin>, ErrorCode> {
        for info in self.registry.plugin_infos(mediaflow_plugin_api::PluginType::Source) {
            if !info.protocols.contains(&protocol) {
                continue;
            }
            let mut slot = self.slot.write();
            if let Some(existing) = slot.plugin.clone() {
                if slot.plugin_name == info.name && existing.reset().is_ok() {
                    debug!("reusing source plugin {}", info.name);
                    return Ok(existing);
                }
                if !existing.deinit().is_ok() {
                    warn!("deinit of source plugin {} failed", slot.plugin_name);
                }
            }
            let plugin = self.registry.create_source(&info.name)?;
            info!("created source plugin {}", info.name);
            slot.plugin = Some(Arc::clone(&plugin));
            slot.plugin_name = info.name.clone();
            return Ok(plugin);
        }
        error!("no source plugin for protocol {:?}", protocol);
        Err(ErrorCode::UnsupportedFormat)
    }

    fn activate_mode(&self, plugin: &Arc<dyn mediaflow_plugin_api::SourcePlugin>) {
        let seekable = plugin.is_seekable();
        self.seekable.store(seekable, Ordering::Release);
        let mut reader = self.reader.lock();
        if seekable {
            // pull mode: downstream drives the reads
            if let Some(task) = reader.take() {
                task.stop();
            }
        } else if reader.is_none() {
            let weak = self.weak.clone();
            *reader = Some(Task::new(format!("{}-reader", self.name()), move || {
                if let Some(filter) = weak.upgrade() {
                    filter.read_loop();
                }
            }));
        }
    }

    fn negotiate_downstream(
        &self,
        source: &MediaSource,
        plugin: &Arc<dyn mediaflow_plugin_api::SourcePlugin>,
    ) -> Result<(), ErrorCode> {
        let Some(ctx) = self.base.context() else {
            return Err(ErrorCode::InvalidState);
        };
        let mut meta = Meta::new();
        let _ = meta.set(
            Tag::Mime,
            TagValue::String(mime::APPLICATION_OCTET_STREAM.into()),
        );
        if let Some(suffix) = source.uri_suffix() {
            let _ = meta.set(Tag::MediaFileExtension, TagValue::String(suffix.into()));
        }
        if let Some(size) = plugin.get_size() {
            let _ = meta.set(Tag::MediaFileSize, TagValue::U64(size));
        }
        let capability = meta.to_capability();
        if ctx
            .negotiate_downstream(PORT_NAME_DEFAULT, &capability)
            .is_none()
        {
            error!("downstream refused source capability");
            return Err(ErrorCode::UnsupportedFormat);
        }
        ctx.configure_downstream(PORT_NAME_DEFAULT, &meta)
    }

    fn read_loop(&self) {
        let Some(plugin) = self.plugin() else {
            return;
        };
        let size = self.read_size.load(Ordering::Relaxed);
        let mut buffer = Buffer::with_capacity(MediaType::Generic, size);
        let status = plugin.read(&mut buffer, size);
        match translate_plugin_status(status) {
            Ok(()) => {
                if let Some(ctx) = self.base.context() {
                    let _ = ctx.push_downstream(PORT_NAME_DEFAULT, buffer);
                }
            }
            Err(ErrorCode::EndOfStream) => {
                debug!("source {} reached end of stream", self.name());
                if let Some(ctx) = self.base.context() {
                    let _ = ctx.push_downstream(PORT_NAME_DEFAULT, Buffer::eos(MediaType::Generic));
                }
                if let Some(task) = self.reader.lock().as_ref() {
                    task.stop_async();
                }
            }
            Err(ErrorCode::Again) => {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            Err(error) => {
                error!("source read failed: {}", error);
                self.base.post_error(error);
                if let Some(task) = self.reader.lock().as_ref() {
                    task.stop_async();
                }
            }
        }
    }
}

impl Filter for SourceFilter {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn out_ports(&self) -> Vec<String> {
        vec![PORT_NAME_DEFAULT.to_string()]
    }

    fn prepare(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.prepare())?;
        self.base.set_state(FilterState::Ready);
        self.base.post_ready();
        Ok(())
    }

    fn start(&self) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        translate_plugin_status(plugin.start())?;
        if let Some(task) = self.reader.lock().as_ref() {
            task.start();
        }
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn pause(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.reader.lock().as_ref() {
            task.pause();
        }
        self.base.set_state(FilterState::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.reader.lock().as_ref() {
            task.start();
        }
        self.base.set_state(FilterState::Running);
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if let Some(task) = self.reader.lock().as_ref() {
            task.stop();
        }
        self.position.store(0, Ordering::Release);
        if let Some(plugin) = self.plugin() {
            translate_plugin_status(plugin.stop())?;
        }
        self.base.set_state(FilterState::Initialized);
        Ok(())
    }

    fn pull_data(
        &self,
        _out_port: &str,
        offset: u64,
        size: usize,
        buffer: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        let plugin = self.plugin().ok_or(ErrorCode::InvalidOperation)?;
        let mut read_size = size;
        if self.is_seekable() {
            if let Some(total) = plugin.get_size().filter(|t| *t > 0) {
                if offset >= total {
                    return Err(ErrorCode::EndOfStream);
                }
                read_size = read_size.min((total - offset) as usize);
            }
            let capacity = buffer.memory_mut(read_size).capacity();
            read_size = read_size.min(capacity);
            if self.position.load(Ordering::Acquire) != offset {
                translate_plugin_status(plugin.seek_to(offset))?;
                self.position.store(offset, Ordering::Release);
            }
        }
        translate_plugin_status(plugin.read(buffer, read_size))?;
        self.position
            .fetch_add(buffer.size() as u64, Ordering::AcqRel);
        Ok(())
    }
}

impl Drop for SourceFilter {
    fn drop(&mut self) {
        if let Some(task) = self.reader.lock().take() {
            task.stop();
        }
        if let Some(plugin) = self.slot.read().plugin.clone() {
            let _ = plugin.deinit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fd_uri() {
        assert_eq!(
            parse_fd_uri("fd://3?offset=16&size=1024"),
            Some(MediaSource::Fd {
                fd: 3,
                offset: 16,
                size: 1024
            })
        );
        assert_eq!(parse_fd_uri("fd://3"), None);
        assert_eq!(parse_fd_uri("fd://x?offset=0&size=1"), None);
    }
}
