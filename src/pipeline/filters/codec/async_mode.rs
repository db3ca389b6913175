// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Asynchronous codec pump.
//!
//! Three workers drive the plugin: `handle-frame` feeds inputs from the
//! inbound queue, `decode-frame` keeps the plugin's output side supplied
//! with pool buffers, and `finish-frame` moves completed outputs to the
//! downstream port. The plugin's `on_output_buffer_done` callback both
//! queues the completed buffer for `finish-frame` and wakes `handle-frame`
//! when it is parked on back-pressure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use mediaflow_plugin_api::{Buffer, CodecDataCallback, CodecPlugin, Status};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::pipeline::event::EventKind;
use crate::pipeline::filter::FilterContext;
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::util::{BlockingQueue, BufferPool};

/// Sleep between attempts when the plugin has no room for output buffers.
pub(crate) const TRY_DECODE_SLEEP: Duration = Duration::from_millis(20);
/// Sleep when no finished frame is available to render.
pub(crate) const TRY_RENDER_SLEEP: Duration = Duration::from_millis(5);
/// Longest single wait for an output completion while back-pressured.
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(100);
/// Back-pressure retries before the frame is abandoned as an error.
const MAX_BACKPRESSURE_RETRIES: u32 = 50;

/// Capacity of the inbound buffer queue.
pub(crate) const IN_QUEUE_SIZE: usize = 8;

struct BackPressure {
    /// True when the plugin can take more input.
    can_queue_input: Mutex<bool>,
    cond: Condvar,
}

/// State shared between the codec filter, its tasks and the plugin callback.
pub(crate) struct CodecShared {
    name: String,
    pub(crate) plugin: RwLock<Option<Arc<dyn CodecPlugin>>>,
    pub(crate) in_queue: BlockingQueue<Buffer>,
    render: Mutex<VecDeque<Buffer>>,
    pub(crate) out_pool: RwLock<Option<Arc<BufferPool>>>,
    backpressure: BackPressure,
    pub(crate) stopped: AtomicBool,
    /// Whether the initial output-priming pass ran; the first pass fills the
    /// plugin's output queue before start so hardware codecs begin primed.
    pub(crate) primed: AtomicBool,
    pub(crate) ctx: RwLock<Option<FilterContext>>,
}

impl CodecShared {
    pub(crate) fn new(name: String) -> Arc<Self> {
        Arc::new(CodecShared {
            in_queue: BlockingQueue::new(format!("{}-in", name), IN_QUEUE_SIZE),
            name,
            plugin: RwLock::new(None),
            render: Mutex::new(VecDeque::new()),
            out_pool: RwLock::new(None),
            backpressure: BackPressure {
                can_queue_input: Mutex::new(true),
                cond: Condvar::new(),
            },
            stopped: AtomicBool::new(false),
            primed: AtomicBool::new(false),
            ctx: RwLock::new(None),
        })
    }

    pub(crate) fn plugin(&self) -> Option<Arc<dyn CodecPlugin>> {
        self.plugin.read().clone()
    }

    fn post_error(&self, error: ErrorCode) {
        if let Some(ctx) = self.ctx.read().clone() {
            ctx.post_event(&self.name, EventKind::Error(error));
        }
    }

    /// Feed one input buffer to the plugin, honoring back-pressure.
    pub(crate) fn handle_frame(&self) {
        let Some(buffer) = self.in_queue.pop() else {
            return;
        };
        let Some(plugin) = self.plugin() else {
            return;
        };
        let mut pending = buffer;
        for _ in 0..MAX_BACKPRESSURE_RETRIES {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            match plugin.queue_input_buffer(pending, 0) {
                Ok(()) => return,
                Err(rejected) if rejected.status == Status::ErrorAgain => {
                    pending = rejected.buffer;
                    self.wait_for_output_done();
                }
                Err(rejected) => {
                    warn!(
                        "{}: plugin rejected input: {:?}",
                        self.name, rejected.status
                    );
                    return;
                }
            }
        }
        warn!("{}: back-pressure retries exhausted", self.name);
        self.post_error(ErrorCode::Unknown);
    }

    /// Keep the plugin's output side supplied with empty pool buffers.
    pub(crate) fn decode_frame(&self) {
        let pool = self.out_pool.read().clone();
        let (Some(pool), Some(plugin)) = (pool, self.plugin()) else {
            std::thread::sleep(TRY_DECODE_SLEEP);
            return;
        };
        match pool.allocate(Some(TRY_DECODE_SLEEP)) {
            Some(mut buffer) => {
                buffer.reset();
                if let Err(rejected) = plugin.queue_output_buffer(buffer, 0) {
                    debug!(
                        "{}: output buffer not accepted: {:?}",
                        self.name, rejected.status
                    );
                    std::thread::sleep(TRY_DECODE_SLEEP);
                }
            }
            None => std::thread::sleep(TRY_DECODE_SLEEP),
        }
    }

    /// Push one finished frame downstream.
    pub(crate) fn finish_frame(&self) {
        let frame = self.render.lock().pop_front();
        match frame {
            Some(frame) => {
                let ctx = self.ctx.read().clone();
                if let Some(ctx) = ctx {
                    if let Err(error) = ctx.push_downstream(PORT_NAME_DEFAULT, frame) {
                        debug!("{}: finished frame dropped: {}", self.name, error);
                    }
                }
            }
            None => std::thread::sleep(TRY_RENDER_SLEEP),
        }
    }

    /// Queue every idle pool buffer into the plugin's output side.
    pub(crate) fn queue_all_pool_buffers(&self) {
        let pool = self.out_pool.read().clone();
        let (Some(pool), Some(plugin)) = (pool, self.plugin()) else {
            return;
        };
        while !pool.is_empty() {
            let Some(mut buffer) = pool.allocate(Some(Duration::from_millis(0))) else {
                break;
            };
            buffer.reset();
            if let Err(rejected) = plugin.queue_output_buffer(buffer, -1) {
                warn!(
                    "{}: plugin does not take all output buffers: {:?}",
                    self.name, rejected.status
                );
                break;
            }
        }
    }

    pub(crate) fn clear_render_queue(&self) {
        self.render.lock().clear();
    }

    /// Wake anyone parked on back-pressure (used by flush/stop).
    pub(crate) fn release_backpressure(&self) {
        let mut can_queue = self.backpressure.can_queue_input.lock();
        *can_queue = true;
        self.backpressure.cond.notify_all();
    }

    fn wait_for_output_done(&self) {
        let mut can_queue = self.backpressure.can_queue_input.lock();
        *can_queue = false;
        while !*can_queue && !self.stopped.load(Ordering::Acquire) {
            if self
                .backpressure
                .cond
                .wait_for(&mut can_queue, BACKPRESSURE_WAIT)
                .timed_out()
            {
                break;
            }
        }
    }

    fn on_output_done(&self, buffer: Buffer) {
        self.render.lock().push_back(buffer);
        self.release_backpressure();
    }
}

/// The callback handed to the plugin through `set_data_callback`.
pub(crate) struct CodecCallback {
    shared: Weak<CodecShared>,
}

impl CodecCallback {
    pub(crate) fn new(shared: &Arc<CodecShared>) -> Arc<Self> {
        Arc::new(CodecCallback {
            shared: Arc::downgrade(shared),
        })
    }
}

impl CodecDataCallback for CodecCallback {
    fn on_input_buffer_done(&self, buffer: Buffer) {
        // dropping returns pooled memory to its upstream pool
        drop(buffer);
    }

    fn on_output_buffer_done(&self, buffer: Buffer) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_output_done(buffer);
        }
    }
}
