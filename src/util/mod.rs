// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Blocking primitives shared by the pipeline filters.

pub mod blocking_queue;
pub mod buffer_pool;

pub use blocking_queue::BlockingQueue;
pub use buffer_pool::BufferPool;
