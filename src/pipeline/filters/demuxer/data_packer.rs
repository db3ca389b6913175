// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Inbound byte assembler for push-mode demuxing.
//!
//! Upstream pushes buffers of arbitrary size; the packer stores them with
//! their originating byte offsets and serves range queries. A range that
//! straddles missing data is refused outright, never partially delivered.

use std::collections::VecDeque;

use mediaflow_plugin_api::Buffer;
use parking_lot::Mutex;
use tracing::{debug, warn};

struct PackerState {
    chunks: VecDeque<Vec<u8>>,
    /// Media-file offset of the first held byte.
    start_offset: u64,
    /// Total held bytes across all chunks.
    total: usize,
    /// Whether `start_offset` is meaningful (false right after a flush).
    anchored: bool,
    eos: bool,
}

/// Byte-range store between a pushing source and the demuxer plugin.
pub struct DataPacker {
    state: Mutex<PackerState>,
}

impl Default for DataPacker {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPacker {
    /// Empty packer.
    pub fn new() -> Self {
        DataPacker {
            state: Mutex::new(PackerState {
                chunks: VecDeque::new(),
                start_offset: 0,
                total: 0,
                anchored: false,
                eos: false,
            }),
        }
    }

    /// Store `data` at media-file `offset`.
    ///
    /// Contiguous pushes append; a non-contiguous offset re-anchors the
    /// packer (held data is dropped), which happens after a seek.
    pub fn push_at(&self, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let end = state.start_offset + state.total as u64;
        if !state.anchored {
            state.start_offset = offset;
            state.anchored = true;
        } else if offset != end {
            warn!(
                "non-contiguous push at {} (expected {}), re-anchoring",
                offset, end
            );
            state.chunks.clear();
            state.total = 0;
            state.start_offset = offset;
        }
        state.total += data.len();
        state.chunks.push_back(data.to_vec());
    }

    /// Mark that no more data will arrive.
    pub fn set_eos(&self) {
        self.state.lock().eos = true;
    }

    /// Whether end-of-stream was pushed.
    pub fn is_eos(&self) -> bool {
        self.state.lock().eos
    }

    /// Media-file offset one past the last held byte.
    pub fn end_offset(&self) -> u64 {
        let state = self.state.lock();
        state.start_offset + state.total as u64
    }

    /// Whether the whole range `[offset, offset+size)` is held.
    pub fn is_data_available(&self, offset: u64, size: usize) -> bool {
        let state = self.state.lock();
        Self::available(&state, offset, size)
    }

    /// Copy a range into `out` without consuming it.
    pub fn peek_range(&self, offset: u64, size: usize, out: &mut Buffer) -> bool {
        let state = self.state.lock();
        if !Self::available(&state, offset, size) {
            return false;
        }
        Self::copy_range(&state, offset, size, out);
        true
    }

    /// Copy a range into `out` and release everything up to its end.
    pub fn get_range(&self, offset: u64, size: usize, out: &mut Buffer) -> bool {
        let mut state = self.state.lock();
        if !Self::available(&state, offset, size) {
            return false;
        }
        Self::copy_range(&state, offset, size, out);
        let consume = (offset + size as u64 - state.start_offset) as usize;
        Self::drop_front(&mut state, consume);
        true
    }

    /// Drop all held data.
    pub fn flush(&self) {
        debug!("data packer flushed");
        let mut state = self.state.lock();
        state.chunks.clear();
        state.total = 0;
        state.anchored = false;
        state.eos = false;
    }

    fn available(state: &PackerState, offset: u64, size: usize) -> bool {
        if !state.anchored || offset < state.start_offset {
            return false;
        }
        offset + size as u64 <= state.start_offset + state.total as u64
    }

    fn copy_range(state: &PackerState, offset: u64, size: usize, out: &mut Buffer) {
        let mut skip = (offset - state.start_offset) as usize;
        let mut remaining = size;
        let memory = out.memory_mut(size);
        memory.reset();
        for chunk in &state.chunks {
            if remaining == 0 {
                break;
            }
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            let take = (chunk.len() - skip).min(remaining);
            memory.write(&chunk[skip..skip + take]);
            remaining -= take;
            skip = 0;
        }
    }

    fn drop_front(state: &mut PackerState, mut count: usize) {
        state.start_offset += count as u64;
        state.total -= count;
        while count > 0 {
            let front_len = match state.chunks.front() {
                Some(front) => front.len(),
                None => break,
            };
            if front_len <= count {
                state.chunks.pop_front();
                count -= front_len;
            } else {
                let front = state.chunks.front_mut().expect("nonempty front chunk");
                front.drain(..count);
                count = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_plugin_api::MediaType;

    fn buffer() -> Buffer {
        Buffer::with_capacity(MediaType::Generic, 64)
    }

    #[test]
    fn test_range_across_chunks() {
        let packer = DataPacker::new();
        packer.push_at(0, b"abcd");
        packer.push_at(4, b"efgh");
        packer.push_at(8, b"ij");
        let mut out = buffer();
        assert!(packer.peek_range(2, 7, &mut out));
        assert_eq!(out.as_slice(), b"cdefghi");
        // peeking does not consume
        assert!(packer.is_data_available(0, 10));
    }

    #[test]
    fn test_missing_data_is_refused_whole() {
        let packer = DataPacker::new();
        packer.push_at(0, b"abcd");
        let mut out = buffer();
        assert!(!packer.peek_range(2, 4, &mut out));
        assert_eq!(out.size(), 0, "no partial delivery");
        assert!(!packer.is_data_available(4, 1));
    }

    #[test]
    fn test_get_range_consumes() {
        let packer = DataPacker::new();
        packer.push_at(0, b"abcdefgh");
        let mut out = buffer();
        assert!(packer.get_range(0, 4, &mut out));
        assert_eq!(out.as_slice(), b"abcd");
        assert!(!packer.is_data_available(0, 1));
        assert!(packer.is_data_available(4, 4));
        let mut out2 = buffer();
        assert!(packer.get_range(4, 4, &mut out2));
        assert_eq!(out2.as_slice(), b"efgh");
    }

    #[test]
    fn test_flush_drops_everything() {
        let packer = DataPacker::new();
        packer.push_at(0, b"abcd");
        packer.set_eos();
        packer.flush();
        assert!(!packer.is_data_available(0, 1));
        assert!(!packer.is_eos());
        // re-anchors at the next push offset
        packer.push_at(100, b"xy");
        assert!(packer.is_data_available(100, 2));
    }
}
