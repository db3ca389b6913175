// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The filter capability and its shared base.
//!
//! Concrete filter kinds (source, demuxer, codec, sink, muxer) differ only in
//! the operations they override; everything shared — name, state, the
//! pipeline context used to reach peers — lives in [`FilterBase`]. Filters
//! are driven concurrently: lifecycle calls come from the engine thread,
//! data calls from upstream worker threads, so every method takes `&self`
//! and filters synchronize internally.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Weak;

use mediaflow_plugin_api::{Buffer, Capability, Meta};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::pipeline::core::PipelineGraph;
use crate::pipeline::event::{Event, EventKind};
use crate::pipeline::port::PortInfo;

/// Index of a filter inside its pipeline.
pub type FilterId = usize;

/// Role of a filter in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Byte source.
    MediaSource,
    /// Container demuxer.
    Demuxer,
    /// Audio decoder.
    AudioDecoder,
    /// Video decoder.
    VideoDecoder,
    /// Audio encoder.
    AudioEncoder,
    /// Video encoder.
    VideoEncoder,
    /// Audio renderer.
    AudioSink,
    /// Video renderer.
    VideoSink,
    /// Container muxer.
    Muxer,
    /// Output byte sink.
    OutputSink,
}

/// Lifecycle state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterState {
    /// Constructed, not yet in a pipeline.
    Created = 0,
    /// Added to a pipeline.
    Initialized = 1,
    /// Prepare issued, waiting for negotiation/configuration.
    Preparing = 2,
    /// Configured and ready to run.
    Ready = 3,
    /// Pumping data.
    Running = 4,
    /// Paused between buffers.
    Paused = 5,
}

impl FilterState {
    fn from_u8(value: u8) -> FilterState {
        match value {
            0 => FilterState::Created,
            1 => FilterState::Initialized,
            2 => FilterState::Preparing,
            3 => FilterState::Ready,
            4 => FilterState::Running,
            _ => FilterState::Paused,
        }
    }
}

/// Kind of a filter-to-engine callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackType {
    /// The filter grew new ports (demuxer after header parse).
    PortAdded,
    /// The filter is removing ports; downstream chains must go.
    PortRemove,
}

/// Receiver of dynamic-port callbacks (implemented by the engines).
pub trait FilterCallback: Send + Sync {
    /// React to a port change on `filter`.
    fn on_callback(
        &self,
        callback_type: CallbackType,
        filter: FilterId,
        info: &PortInfo,
    ) -> Result<(), ErrorCode>;
}

/// Handle a filter uses to reach its pipeline: peers, events, callbacks.
///
/// All resolution goes through the owning [`PipelineGraph`] on each use; the
/// context itself holds only the filter id and a weak graph reference.
#[derive(Clone)]
pub struct FilterContext {
    id: FilterId,
    graph: Weak<PipelineGraph>,
}

impl FilterContext {
    pub(crate) fn new(id: FilterId, graph: Weak<PipelineGraph>) -> Self {
        FilterContext { id, graph }
    }

    /// Id of the owning filter.
    pub fn id(&self) -> FilterId {
        self.id
    }

    /// Push a buffer into the in-port linked to `out_port`.
    pub fn push_downstream(&self, out_port: &str, buffer: Buffer) -> Result<(), ErrorCode> {
        let graph = self.graph.upgrade().ok_or(ErrorCode::InvalidState)?;
        let (peer, in_port) = graph
            .downstream_of(self.id, out_port)
            .ok_or(ErrorCode::NotExisted)?;
        peer.push_data(&in_port, buffer)
    }

    /// Offer a capability to the in-port linked to `out_port`.
    pub fn negotiate_downstream(&self, out_port: &str, capability: &Capability) -> Option<Capability> {
        let graph = self.graph.upgrade()?;
        let (peer, in_port) = graph.downstream_of(self.id, out_port)?;
        peer.negotiate(&in_port, capability)
    }

    /// Configure the in-port linked to `out_port` with a concrete meta.
    pub fn configure_downstream(&self, out_port: &str, meta: &Meta) -> Result<(), ErrorCode> {
        let graph = self.graph.upgrade().ok_or(ErrorCode::InvalidState)?;
        let (peer, in_port) = graph
            .downstream_of(self.id, out_port)
            .ok_or(ErrorCode::NotExisted)?;
        peer.configure(&in_port, meta)
    }

    /// Pull a byte range from the out-port linked to `in_port`.
    pub fn pull_upstream(
        &self,
        in_port: &str,
        offset: u64,
        size: usize,
        buffer: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        let graph = self.graph.upgrade().ok_or(ErrorCode::InvalidState)?;
        let (peer, out_port) = graph
            .upstream_of(self.id, in_port)
            .ok_or(ErrorCode::NotExisted)?;
        peer.pull_data(&out_port, offset, size, buffer)
    }

    /// Whether `out_port` is linked to a downstream in-port.
    pub fn has_downstream(&self, out_port: &str) -> bool {
        self.graph
            .upgrade()
            .and_then(|g| g.downstream_of(self.id, out_port))
            .is_some()
    }

    /// Report an event to the pipeline.
    pub fn post_event(&self, source: &str, kind: EventKind) {
        if let Some(graph) = self.graph.upgrade() {
            graph.on_filter_event(
                self.id,
                Event {
                    source: source.to_string(),
                    kind,
                },
            );
        }
    }

    /// Report a dynamic-port change to the engine.
    pub fn notify_callback(
        &self,
        callback_type: CallbackType,
        info: &PortInfo,
    ) -> Result<(), ErrorCode> {
        let graph = self.graph.upgrade().ok_or(ErrorCode::InvalidState)?;
        graph.on_filter_callback(self.id, callback_type, info)
    }
}

/// State shared by every filter implementation.
pub struct FilterBase {
    name: String,
    filter_type: FilterType,
    state: AtomicU8,
    ctx: RwLock<Option<FilterContext>>,
}

impl FilterBase {
    /// New base in `Created` state.
    pub fn new(name: impl Into<String>, filter_type: FilterType) -> Self {
        FilterBase {
            name: name.into(),
            filter_type,
            state: AtomicU8::new(FilterState::Created as u8),
            ctx: RwLock::new(None),
        }
    }

    /// Filter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter role.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Current state.
    pub fn state(&self) -> FilterState {
        FilterState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to a new state.
    pub fn set_state(&self, state: FilterState) {
        debug!("filter {} -> {:?}", self.name, state);
        self.state.store(state as u8, Ordering::Release);
    }

    /// Install the pipeline context (called from `Filter::init`).
    pub fn set_context(&self, ctx: FilterContext) {
        *self.ctx.write() = Some(ctx);
    }

    /// The pipeline context, once the filter was added to a pipeline.
    pub fn context(&self) -> Option<FilterContext> {
        self.ctx.read().clone()
    }

    /// Post an event under this filter's name.
    pub fn post_event(&self, kind: EventKind) {
        match self.context() {
            Some(ctx) => ctx.post_event(&self.name, kind),
            None => warn!("filter {} posted event before init", self.name),
        }
    }

    /// Post `Ready`.
    pub fn post_ready(&self) {
        self.post_event(EventKind::Ready);
    }

    /// Post a fatal error.
    pub fn post_error(&self, error: ErrorCode) {
        self.post_event(EventKind::Error(error));
    }
}

/// A node in the media pipeline.
pub trait Filter: Send + Sync {
    /// The shared base.
    fn base(&self) -> &FilterBase;

    /// Filter name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Filter role.
    fn filter_type(&self) -> FilterType {
        self.base().filter_type()
    }

    /// Current lifecycle state.
    fn state(&self) -> FilterState {
        self.base().state()
    }

    /// Bind to a pipeline. Called once by `Pipeline::add_filters`.
    fn init(&self, ctx: FilterContext) {
        self.base().set_context(ctx);
        self.base().set_state(FilterState::Initialized);
    }

    /// Get ready to accept data. Ready is reported asynchronously through an
    /// event once negotiation/configuration completes.
    fn prepare(&self) -> Result<(), ErrorCode> {
        self.base().set_state(FilterState::Preparing);
        Ok(())
    }

    /// Begin pumping.
    fn start(&self) -> Result<(), ErrorCode> {
        self.base().set_state(FilterState::Running);
        Ok(())
    }

    /// Pause pumping, keeping position.
    fn pause(&self) -> Result<(), ErrorCode> {
        self.base().set_state(FilterState::Paused);
        Ok(())
    }

    /// Continue after `pause`.
    fn resume(&self) -> Result<(), ErrorCode> {
        self.base().set_state(FilterState::Running);
        Ok(())
    }

    /// Stop pumping and release runtime resources.
    fn stop(&self) -> Result<(), ErrorCode> {
        self.base().set_state(FilterState::Initialized);
        Ok(())
    }

    /// Enter the flushing quiescent state (queues inactive, tasks paused).
    fn flush_start(&self) {}

    /// Leave the flushing state, restoring queues and tasks.
    fn flush_end(&self) {}

    /// Declared in-port names.
    fn in_ports(&self) -> Vec<String> {
        Vec::new()
    }

    /// Declared out-port names.
    fn out_ports(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether `name` is (or may become) a valid in-port.
    fn accepts_in_port(&self, name: &str) -> bool {
        self.in_ports().iter().any(|p| p == name)
    }

    /// Whether `name` is a valid out-port.
    fn accepts_out_port(&self, name: &str) -> bool {
        self.out_ports().iter().any(|p| p == name)
    }

    /// Upstream offers `capability` into `in_port`; return the accepted
    /// sub-capability, or `None` to refuse.
    fn negotiate(&self, _in_port: &str, _capability: &Capability) -> Option<Capability> {
        None
    }

    /// Upstream hands the concrete negotiated meta for `in_port`.
    fn configure(&self, _in_port: &str, _meta: &Meta) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Push-mode data entry point.
    fn push_data(&self, _in_port: &str, _buffer: Buffer) -> Result<(), ErrorCode> {
        Err(ErrorCode::Unimplemented)
    }

    /// Pull-mode data exit point.
    fn pull_data(
        &self,
        _out_port: &str,
        _offset: u64,
        _size: usize,
        _buffer: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        Err(ErrorCode::Unimplemented)
    }
}
