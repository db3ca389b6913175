// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reusable buffer pools.
//!
//! A pool pre-allocates a fixed count of identical-capacity memory blocks.
//! `allocate` blocks until a block is idle and wraps it in a [`Buffer`] whose
//! drop returns the block to the pool (payload size reset, contents kept).
//! An inactive pool fails allocations immediately and wakes blocked callers.
//! At most `count` buffers exist outside the pool at any instant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mediaflow_plugin_api::{Buffer, BufferAllocator, MediaType, Memory, MemoryReclaimer};
use parking_lot::{Condvar, Mutex};

struct PoolState {
    idle: Vec<Memory>,
    active: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    cond: Condvar,
}

impl MemoryReclaimer for PoolShared {
    fn reclaim(&self, memory: Memory) {
        let mut state = self.state.lock();
        state.idle.push(memory);
        self.cond.notify_one();
    }
}

/// Fixed-count pool of identical-capacity buffers.
pub struct BufferPool {
    media_type: MediaType,
    count: usize,
    buffer_capacity: usize,
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Pre-allocate `count` buffers of `buffer_capacity` bytes each.
    pub fn new(media_type: MediaType, count: usize, buffer_capacity: usize) -> Arc<Self> {
        Self::with_allocator(
            media_type,
            count,
            buffer_capacity,
            &mediaflow_plugin_api::buffer::null_allocator(),
        )
    }

    /// Pre-allocate through a plugin-provided allocator.
    pub fn with_allocator(
        media_type: MediaType,
        count: usize,
        buffer_capacity: usize,
        allocator: &Arc<dyn BufferAllocator>,
    ) -> Arc<Self> {
        let idle = (0..count).map(|_| allocator.allocate(buffer_capacity)).collect();
        Arc::new(BufferPool {
            media_type,
            count,
            buffer_capacity,
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState { idle, active: true }),
                cond: Condvar::new(),
            }),
        })
    }

    /// Total number of buffers owned by the pool.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Capacity of each pooled buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Whether no buffer is idle.
    pub fn is_empty(&self) -> bool {
        self.idle_count() == 0
    }

    /// Take an idle buffer, blocking up to `timeout` (`None` blocks forever).
    ///
    /// Returns `None` on timeout or when the pool is inactive. The returned
    /// buffer re-enters the pool when dropped.
    pub fn allocate(&self, timeout: Option<Duration>) -> Option<Buffer> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            if !state.active {
                return None;
            }
            if let Some(memory) = state.idle.pop() {
                return Some(Buffer::from_pool(
                    self.media_type,
                    memory,
                    Arc::clone(&self.shared) as Arc<dyn MemoryReclaimer>,
                ));
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                        return None;
                    }
                }
                None => self.shared.cond.wait(&mut state),
            }
        }
    }

    /// Activate or deactivate the pool.
    ///
    /// An inactive pool fails all `allocate` calls and wakes blocked callers.
    /// Buffers already outside the pool still return on drop.
    pub fn set_active(&self, active: bool) {
        let mut state = self.shared.state.lock();
        state.active = active;
        if !active {
            self.shared.cond.notify_all();
        }
    }
}
