// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Plugin registration and lookup.
//!
//! The registry is built once at engine startup and is immutable afterwards.
//! It answers three questions: which plugins exist for a type, what can a
//! plugin do ([`PluginInfo`]), and how to instantiate one by name. Filters
//! own the instances they create; the registry never hands out aliases.

use std::sync::Arc;

use mediaflow_plugin_api::{
    AudioSinkPlugin, CodecPlugin, DemuxerPlugin, MuxerPlugin, OutputSinkPlugin, PluginInfo,
    PluginType, SourcePlugin, VideoSinkPlugin,
};
use tracing::debug;

use crate::error::ErrorCode;

/// Sniffer a demuxer registers: does this byte prefix look like my format?
pub type Sniffer = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

enum PluginFactory {
    Source(Box<dyn Fn() -> Arc<dyn SourcePlugin> + Send + Sync>),
    Demuxer(Box<dyn Fn() -> Arc<dyn DemuxerPlugin> + Send + Sync>),
    Codec(Box<dyn Fn() -> Arc<dyn CodecPlugin> + Send + Sync>),
    AudioSink(Box<dyn Fn() -> Arc<dyn AudioSinkPlugin> + Send + Sync>),
    VideoSink(Box<dyn Fn() -> Arc<dyn VideoSinkPlugin> + Send + Sync>),
    Muxer(Box<dyn Fn() -> Arc<dyn MuxerPlugin> + Send + Sync>),
    OutputSink(Box<dyn Fn() -> Arc<dyn OutputSinkPlugin> + Send + Sync>),
}

struct PluginEntry {
    info: Arc<PluginInfo>,
    factory: PluginFactory,
    sniffer: Option<Sniffer>,
}

/// Append-only plugin table, immutable once built.
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

/// Builder used at engine startup to assemble the registry.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<PluginEntry>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Register a source plugin.
    pub fn source(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn SourcePlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::Source);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::Source(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Register a demuxer plugin with its format sniffer.
    pub fn demuxer(
        mut self,
        info: PluginInfo,
        sniffer: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
        factory: impl Fn() -> Arc<dyn DemuxerPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::Demuxer);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::Demuxer(Box::new(factory)),
            sniffer: Some(Box::new(sniffer)),
        });
        self
    }

    /// Register a codec plugin.
    pub fn codec(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn CodecPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::Codec);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::Codec(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Register an audio sink plugin.
    pub fn audio_sink(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn AudioSinkPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::AudioSink);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::AudioSink(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Register a video sink plugin.
    pub fn video_sink(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn VideoSinkPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::VideoSink);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::VideoSink(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Register a muxer plugin.
    pub fn muxer(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn MuxerPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::Muxer);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::Muxer(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Register an output sink plugin.
    pub fn output_sink(
        mut self,
        info: PluginInfo,
        factory: impl Fn() -> Arc<dyn OutputSinkPlugin> + Send + Sync + 'static,
    ) -> Self {
        debug_assert_eq!(info.plugin_type, PluginType::OutputSink);
        self.entries.push(PluginEntry {
            info: Arc::new(info),
            factory: PluginFactory::OutputSink(Box::new(factory)),
            sniffer: None,
        });
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<PluginRegistry> {
        Arc::new(PluginRegistry {
            entries: self.entries,
        })
    }
}

impl PluginRegistry {
    /// Plugin names of one type, highest rank first; insertion order breaks
    /// rank ties.
    pub fn list_plugins(&self, plugin_type: PluginType) -> Vec<String> {
        let mut named: Vec<&PluginEntry> = self
            .entries
            .iter()
            .filter(|e| e.info.plugin_type == plugin_type)
            .collect();
        named.sort_by(|a, b| b.info.rank.cmp(&a.info.rank));
        named.iter().map(|e| e.info.name.clone()).collect()
    }

    /// Descriptor of a plugin.
    pub fn plugin_info(&self, plugin_type: PluginType, name: &str) -> Option<Arc<PluginInfo>> {
        self.find(plugin_type, name).map(|e| Arc::clone(&e.info))
    }

    /// Descriptors of all plugins of one type, highest rank first.
    pub fn plugin_infos(&self, plugin_type: PluginType) -> Vec<Arc<PluginInfo>> {
        self.list_plugins(plugin_type)
            .iter()
            .filter_map(|name| self.plugin_info(plugin_type, name))
            .collect()
    }

    /// Run registered demuxer sniffers over a byte prefix, highest rank
    /// first; returns the first matching plugin name.
    pub fn sniff(&self, data: &[u8]) -> Option<String> {
        for name in self.list_plugins(PluginType::Demuxer) {
            let entry = self.find(PluginType::Demuxer, &name)?;
            if let Some(sniffer) = &entry.sniffer {
                if sniffer(data) {
                    debug!("sniffed format {}", name);
                    return Some(name);
                }
            }
        }
        None
    }

    /// Instantiate a source plugin by name.
    pub fn create_source(&self, name: &str) -> Result<Arc<dyn SourcePlugin>, ErrorCode> {
        match &self.find(PluginType::Source, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::Source(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate a demuxer plugin by name.
    pub fn create_demuxer(&self, name: &str) -> Result<Arc<dyn DemuxerPlugin>, ErrorCode> {
        match &self.find(PluginType::Demuxer, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::Demuxer(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate a codec plugin by name.
    pub fn create_codec(&self, name: &str) -> Result<Arc<dyn CodecPlugin>, ErrorCode> {
        match &self.find(PluginType::Codec, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::Codec(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate an audio sink plugin by name.
    pub fn create_audio_sink(&self, name: &str) -> Result<Arc<dyn AudioSinkPlugin>, ErrorCode> {
        match &self.find(PluginType::AudioSink, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::AudioSink(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate a video sink plugin by name.
    pub fn create_video_sink(&self, name: &str) -> Result<Arc<dyn VideoSinkPlugin>, ErrorCode> {
        match &self.find(PluginType::VideoSink, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::VideoSink(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate a muxer plugin by name.
    pub fn create_muxer(&self, name: &str) -> Result<Arc<dyn MuxerPlugin>, ErrorCode> {
        match &self.find(PluginType::Muxer, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::Muxer(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    /// Instantiate an output sink plugin by name.
    pub fn create_output_sink(&self, name: &str) -> Result<Arc<dyn OutputSinkPlugin>, ErrorCode> {
        match &self.find(PluginType::OutputSink, name).ok_or(ErrorCode::PluginNotFound)?.factory {
            PluginFactory::OutputSink(f) => Ok(f()),
            _ => Err(ErrorCode::PluginNotFound),
        }
    }

    fn find(&self, plugin_type: PluginType, name: &str) -> Option<&PluginEntry> {
        self.entries
            .iter()
            .find(|e| e.info.plugin_type == plugin_type && e.info.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_plugin_api::{Capability, MediaSource, Status};

    struct NullSource;
    impl mediaflow_plugin_api::PluginBase for NullSource {}
    impl SourcePlugin for NullSource {
        fn set_source(&self, _source: &MediaSource) -> Status {
            Status::Ok
        }
        fn read(&self, _buffer: &mut mediaflow_plugin_api::Buffer, _len: usize) -> Status {
            Status::EndOfStream
        }
        fn get_size(&self) -> Option<u64> {
            None
        }
        fn is_seekable(&self) -> bool {
            false
        }
        fn seek_to(&self, _offset: u64) -> Status {
            Status::ErrorUnimplemented
        }
    }

    fn registry_with_two_demuxers() -> Arc<PluginRegistry> {
        RegistryBuilder::new()
            .demuxer(
                PluginInfo::new("low.rank", PluginType::Demuxer, 10)
                    .with_in_cap(Capability::new(mediaflow_plugin_api::mime::ANY)),
                |data| data.starts_with(b"LOW"),
                || unimplemented!("never instantiated in this test"),
            )
            .demuxer(
                PluginInfo::new("high.rank", PluginType::Demuxer, 100)
                    .with_in_cap(Capability::new(mediaflow_plugin_api::mime::ANY)),
                |data| data.starts_with(b"L"),
                || unimplemented!("never instantiated in this test"),
            )
            .build()
    }

    #[test]
    fn test_list_orders_by_rank() {
        let registry = registry_with_two_demuxers();
        assert_eq!(
            registry.list_plugins(PluginType::Demuxer),
            vec!["high.rank".to_string(), "low.rank".to_string()]
        );
    }

    #[test]
    fn test_sniff_prefers_rank() {
        let registry = registry_with_two_demuxers();
        // both sniffers match; the higher rank wins
        assert_eq!(registry.sniff(b"LOW..."), Some("high.rank".to_string()));
        assert_eq!(registry.sniff(b"???"), None);
    }

    #[test]
    fn test_create_by_name() {
        let registry = RegistryBuilder::new()
            .source(
                PluginInfo::new("mem.source", PluginType::Source, 50),
                || Arc::new(NullSource),
            )
            .build();
        assert!(registry.create_source("mem.source").is_ok());
        assert_eq!(
            registry.create_source("nope").err(),
            Some(ErrorCode::PluginNotFound)
        );
        assert!(registry.plugin_info(PluginType::Source, "mem.source").is_some());
    }
}
