// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The pipeline: a filter arena plus the port links between filters.
//!
//! Filters are stored in the order they were added, which callers keep
//! topological (sources before sinks). Lifecycle calls that make a filter
//! consume data (`prepare`, `start`, `resume`, `flush_end`) run leaves
//! first, so a downstream is ready before its upstream produces; calls that
//! stop production (`pause`, `stop`, `flush_start`) run sources first.
//!
//! Links carry `(filter id, port name)` pairs; filters resolve peers through
//! [`PipelineGraph`] on every use, so there are no cyclic references.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::pipeline::event::{Event, EventKind, EventReceiver};
use crate::pipeline::filter::{CallbackType, Filter, FilterCallback, FilterContext, FilterId};
use crate::pipeline::port::PortInfo;

struct FilterEntry {
    filter: Arc<dyn Filter>,
    ready: AtomicBool,
}

#[derive(Debug, Clone, PartialEq)]
struct Link {
    from: (FilterId, String),
    to: (FilterId, String),
}

/// Shared pipeline state that filters resolve peers through.
pub struct PipelineGraph {
    filters: RwLock<Vec<Option<FilterEntry>>>,
    links: RwLock<Vec<Link>>,
    receiver: RwLock<Option<Weak<dyn EventReceiver>>>,
    callback: RwLock<Option<Weak<dyn FilterCallback>>>,
    ready_notified: AtomicBool,
}

impl PipelineGraph {
    /// Downstream peer of `(filter, out_port)`: the linked filter and its
    /// in-port name.
    pub fn downstream_of(&self, filter: FilterId, out_port: &str) -> Option<(Arc<dyn Filter>, String)> {
        let links = self.links.read();
        let link = links
            .iter()
            .find(|l| l.from.0 == filter && l.from.1 == out_port)?;
        let peer = self.filter_at(link.to.0)?;
        Some((peer, link.to.1.clone()))
    }

    /// Upstream peer of `(filter, in_port)`: the linked filter and its
    /// out-port name.
    pub fn upstream_of(&self, filter: FilterId, in_port: &str) -> Option<(Arc<dyn Filter>, String)> {
        let links = self.links.read();
        let link = links
            .iter()
            .find(|l| l.to.0 == filter && l.to.1 == in_port)?;
        let peer = self.filter_at(link.from.0)?;
        Some((peer, link.from.1.clone()))
    }

    pub(crate) fn on_filter_event(&self, filter: FilterId, event: Event) {
        if let EventKind::Ready = event.kind {
            debug!("filter {} ready", event.source);
            {
                let filters = self.filters.read();
                if let Some(Some(entry)) = filters.get(filter) {
                    entry.ready.store(true, Ordering::Release);
                }
                let all_ready = filters
                    .iter()
                    .flatten()
                    .all(|e| e.ready.load(Ordering::Acquire));
                if !all_ready || self.ready_notified.swap(true, Ordering::AcqRel) {
                    return;
                }
            }
            info!("pipeline ready");
        }
        if let Some(receiver) = self.receiver.read().as_ref().and_then(Weak::upgrade) {
            receiver.on_event(event);
        }
    }

    pub(crate) fn on_filter_callback(
        &self,
        filter: FilterId,
        callback_type: CallbackType,
        info: &PortInfo,
    ) -> Result<(), ErrorCode> {
        match self.callback.read().as_ref().and_then(Weak::upgrade) {
            Some(callback) => callback.on_callback(callback_type, filter, info),
            None => Err(ErrorCode::InvalidState),
        }
    }

    fn filter_at(&self, id: FilterId) -> Option<Arc<dyn Filter>> {
        self.filters
            .read()
            .get(id)?
            .as_ref()
            .map(|e| Arc::clone(&e.filter))
    }

    fn id_of(&self, filter: &Arc<dyn Filter>) -> Option<FilterId> {
        // compare data pointers only: the same filter may have been coerced
        // to `dyn Filter` at different sites
        let wanted = Arc::as_ptr(filter) as *const ();
        self.filters
            .read()
            .iter()
            .position(|e| matches!(e, Some(e) if Arc::as_ptr(&e.filter) as *const () == wanted))
    }

    /// Would adding an edge `from -> to` close a cycle?
    fn creates_cycle(&self, from: FilterId, to: FilterId) -> bool {
        if from == to {
            return true;
        }
        let links = self.links.read();
        let mut stack = vec![to];
        let mut seen = vec![to];
        while let Some(node) = stack.pop() {
            for link in links.iter().filter(|l| l.from.0 == node) {
                let next = link.to.0;
                if next == from {
                    return true;
                }
                if !seen.contains(&next) {
                    seen.push(next);
                    stack.push(next);
                }
            }
        }
        false
    }
}

/// A filter graph with ordered lifecycle propagation.
pub struct Pipeline {
    graph: Arc<PipelineGraph>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Pipeline {
            graph: Arc::new(PipelineGraph {
                filters: RwLock::new(Vec::new()),
                links: RwLock::new(Vec::new()),
                receiver: RwLock::new(None),
                callback: RwLock::new(None),
                ready_notified: AtomicBool::new(false),
            }),
        }
    }

    /// Install the event receiver and dynamic-port callback.
    pub fn init(&self, receiver: Weak<dyn EventReceiver>, callback: Weak<dyn FilterCallback>) {
        *self.graph.receiver.write() = Some(receiver);
        *self.graph.callback.write() = Some(callback);
    }

    /// The shared graph handle (used by filter contexts).
    pub fn graph(&self) -> &Arc<PipelineGraph> {
        &self.graph
    }

    /// Add filters in topological order. A filter already present is skipped,
    /// so every filter appears exactly once.
    pub fn add_filters(&self, filters: &[Arc<dyn Filter>]) -> Result<(), ErrorCode> {
        for filter in filters {
            if self.graph.id_of(filter).is_some() {
                debug!("filter {} already in pipeline", filter.name());
                continue;
            }
            let mut entries = self.graph.filters.write();
            let id = entries.len();
            entries.push(Some(FilterEntry {
                filter: Arc::clone(filter),
                ready: AtomicBool::new(false),
            }));
            drop(entries);
            self.graph.ready_notified.store(false, Ordering::Release);
            filter.init(FilterContext::new(id, Arc::downgrade(&self.graph)));
            debug!("added filter {} as id {}", filter.name(), id);
        }
        Ok(())
    }

    /// Link consecutive filters through their default ports.
    pub fn link_filters(&self, chain: &[Arc<dyn Filter>]) -> Result<(), ErrorCode> {
        use crate::pipeline::port::PORT_NAME_DEFAULT;
        for pair in chain.windows(2) {
            self.link_ports(
                (&pair[0], PORT_NAME_DEFAULT),
                (&pair[1], PORT_NAME_DEFAULT),
            )?;
        }
        Ok(())
    }

    /// Link an out-port to an in-port.
    pub fn link_ports(
        &self,
        from: (&Arc<dyn Filter>, &str),
        to: (&Arc<dyn Filter>, &str),
    ) -> Result<(), ErrorCode> {
        let from_id = self.graph.id_of(from.0).ok_or(ErrorCode::NotExisted)?;
        let to_id = self.graph.id_of(to.0).ok_or(ErrorCode::NotExisted)?;
        if !from.0.accepts_out_port(from.1) || !to.0.accepts_in_port(to.1) {
            warn!(
                "link {}:{} -> {}:{} names an unknown port",
                from.0.name(),
                from.1,
                to.0.name(),
                to.1
            );
            return Err(ErrorCode::InvalidParameterValue);
        }
        if self.graph.creates_cycle(from_id, to_id) {
            return Err(ErrorCode::InvalidOperation);
        }
        let link = Link {
            from: (from_id, from.1.to_string()),
            to: (to_id, to.1.to_string()),
        };
        let mut links = self.graph.links.write();
        // a connected port has exactly one peer
        links.retain(|l| l.from != link.from && l.to != link.to);
        debug!(
            "linked {}:{} -> {}:{}",
            from.0.name(),
            from.1,
            to.0.name(),
            to.1
        );
        links.push(link);
        Ok(())
    }

    /// Remove `start` and every filter reachable downstream of it.
    pub fn remove_filter_chain(&self, start: &Arc<dyn Filter>) -> Result<(), ErrorCode> {
        let start_id = self.graph.id_of(start).ok_or(ErrorCode::NotExisted)?;
        let mut doomed = vec![start_id];
        {
            let links = self.graph.links.read();
            let mut stack = vec![start_id];
            while let Some(node) = stack.pop() {
                for link in links.iter().filter(|l| l.from.0 == node) {
                    if !doomed.contains(&link.to.0) {
                        doomed.push(link.to.0);
                        stack.push(link.to.0);
                    }
                }
            }
        }
        for id in &doomed {
            if let Some(entry) = self.graph.filters.write()[*id].take() {
                info!("removing filter {}", entry.filter.name());
                let _ = entry.filter.stop();
            }
        }
        self.graph
            .links
            .write()
            .retain(|l| !doomed.contains(&l.from.0) && !doomed.contains(&l.to.0));
        Ok(())
    }

    /// Prepare all filters, leaves first.
    pub fn prepare(&self) -> Result<(), ErrorCode> {
        self.reset_ready_flags();
        self.for_each_reversed("prepare", |f| f.prepare())
    }

    /// Start all filters, leaves first.
    pub fn start(&self) -> Result<(), ErrorCode> {
        self.for_each_reversed("start", |f| f.start())
    }

    /// Pause all filters, sources first.
    pub fn pause(&self) -> Result<(), ErrorCode> {
        self.for_each_forward("pause", |f| f.pause())
    }

    /// Resume all filters, leaves first.
    pub fn resume(&self) -> Result<(), ErrorCode> {
        self.for_each_reversed("resume", |f| f.resume())
    }

    /// Stop all filters, sources first.
    pub fn stop(&self) -> Result<(), ErrorCode> {
        self.reset_ready_flags();
        self.for_each_forward("stop", |f| f.stop())
    }

    /// Enter flushing, sources first.
    pub fn flush_start(&self) {
        let _ = self.for_each_forward("flush_start", |f| {
            f.flush_start();
            Ok(())
        });
    }

    /// Leave flushing, leaves first.
    pub fn flush_end(&self) {
        let _ = self.for_each_reversed("flush_end", |f| {
            f.flush_end();
            Ok(())
        });
    }

    fn reset_ready_flags(&self) {
        self.graph.ready_notified.store(false, Ordering::Release);
        for entry in self.graph.filters.read().iter().flatten() {
            entry.ready.store(false, Ordering::Release);
        }
    }

    fn for_each_forward(
        &self,
        what: &str,
        mut op: impl FnMut(&Arc<dyn Filter>) -> Result<(), ErrorCode>,
    ) -> Result<(), ErrorCode> {
        let filters: Vec<Arc<dyn Filter>> = self
            .graph
            .filters
            .read()
            .iter()
            .flatten()
            .map(|e| Arc::clone(&e.filter))
            .collect();
        let mut result = Ok(());
        for filter in &filters {
            if let Err(error) = op(filter) {
                warn!("{} failed on filter {}: {}", what, filter.name(), error);
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    fn for_each_reversed(
        &self,
        what: &str,
        mut op: impl FnMut(&Arc<dyn Filter>) -> Result<(), ErrorCode>,
    ) -> Result<(), ErrorCode> {
        let filters: Vec<Arc<dyn Filter>> = self
            .graph
            .filters
            .read()
            .iter()
            .flatten()
            .map(|e| Arc::clone(&e.filter))
            .collect();
        let mut result = Ok(());
        for filter in filters.iter().rev() {
            if let Err(error) = op(filter) {
                warn!("{} failed on filter {}: {}", what, filter.name(), error);
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    /// Resolve a filter's id, when it is part of this pipeline.
    pub fn id_of(&self, filter: &Arc<dyn Filter>) -> Option<FilterId> {
        self.graph.id_of(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::{FilterBase, FilterType};
    use crate::pipeline::port::PORT_NAME_DEFAULT;
    use std::sync::atomic::AtomicUsize;

    struct CountingFilter {
        base: FilterBase,
        starts: AtomicUsize,
        stops: AtomicUsize,
        order_log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl CountingFilter {
        fn new(name: &str, order_log: Arc<parking_lot::Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(CountingFilter {
                base: FilterBase::new(name, FilterType::MediaSource),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                order_log,
            })
        }
    }

    impl Filter for CountingFilter {
        fn base(&self) -> &FilterBase {
            &self.base
        }

        fn start(&self) -> Result<(), ErrorCode> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.order_log.lock().push(format!("start:{}", self.name()));
            Ok(())
        }

        fn stop(&self) -> Result<(), ErrorCode> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.order_log.lock().push(format!("stop:{}", self.name()));
            Ok(())
        }

        fn in_ports(&self) -> Vec<String> {
            vec![PORT_NAME_DEFAULT.to_string()]
        }

        fn out_ports(&self) -> Vec<String> {
            vec![PORT_NAME_DEFAULT.to_string()]
        }
    }

    #[allow(clippy::type_complexity)]
    fn chain(
        n: usize,
    ) -> (
        Pipeline,
        Vec<Arc<CountingFilter>>,
        Vec<Arc<dyn Filter>>,
        Arc<parking_lot::Mutex<Vec<String>>>,
    ) {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new();
        let typed: Vec<Arc<CountingFilter>> = (0..n)
            .map(|i| CountingFilter::new(&format!("f{}", i), Arc::clone(&log)))
            .collect();
        let filters: Vec<Arc<dyn Filter>> = typed
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn Filter>)
            .collect();
        pipeline.add_filters(&filters).unwrap();
        pipeline.link_filters(&filters).unwrap();
        (pipeline, typed, filters, log)
    }

    #[test]
    fn test_started_and_stopped_exactly_once() {
        let (pipeline, typed, filters, _) = chain(3);
        // adding a filter twice is a no-op, so it still runs exactly once
        pipeline.add_filters(&filters[1..2].to_vec()).unwrap();
        pipeline.start().unwrap();
        pipeline.stop().unwrap();
        for filter in &typed {
            assert_eq!(filter.starts.load(Ordering::SeqCst), 1);
            assert_eq!(filter.stops.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_start_runs_leaves_first_stop_sources_first() {
        let (pipeline, _, _, log) = chain(3);
        pipeline.start().unwrap();
        pipeline.stop().unwrap();
        let entries = log.lock().clone();
        assert_eq!(
            entries,
            vec![
                "start:f2", "start:f1", "start:f0",
                "stop:f0", "stop:f1", "stop:f2",
            ]
        );
    }

    #[test]
    fn test_linking_rejects_cycles() {
        let (pipeline, _, filters, _) = chain(3);
        let back_edge = pipeline.link_ports(
            (&filters[2], PORT_NAME_DEFAULT),
            (&filters[0], PORT_NAME_DEFAULT),
        );
        assert_eq!(back_edge, Err(ErrorCode::InvalidOperation));
        let self_edge = pipeline.link_ports(
            (&filters[1], PORT_NAME_DEFAULT),
            (&filters[1], PORT_NAME_DEFAULT),
        );
        assert_eq!(self_edge, Err(ErrorCode::InvalidOperation));
    }

    #[test]
    fn test_remove_filter_chain_drops_downstream() {
        let (pipeline, _, filters, log) = chain(3);
        pipeline.remove_filter_chain(&filters[1]).unwrap();
        log.lock().clear();
        pipeline.start().unwrap();
        assert_eq!(log.lock().clone(), vec!["start:f0"]);
        assert!(pipeline.id_of(&filters[1]).is_none());
        assert!(pipeline.id_of(&filters[2]).is_none());
        assert!(pipeline.id_of(&filters[0]).is_some());
    }
}
