// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Media buffers and their backing memory.
//!
//! A [`Buffer`] is the unit of data exchanged between filters and plugins:
//! one [`Memory`] block, a media type, timestamps in engine ticks and a flag
//! set. Buffers move by ownership through the pipeline; a buffer allocated
//! from a pool carries a reclaim hook and returns to its pool when dropped.

use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-buffer flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Last buffer of the stream.
        const EOS = 1 << 0;
        /// Buffer starts a sync point.
        const KEY_FRAME = 1 << 1;
        /// Buffer carries no payload and should be skipped by consumers.
        const DISCARD = 1 << 2;
        /// Buffer carries codec configuration data, not media data.
        const CODEC_DATA = 1 << 3;
    }
}

/// Coarse media classification of a buffer or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Audio samples or compressed audio frames.
    Audio,
    /// Video frames.
    Video,
    /// Untyped byte data (e.g. container bytes between source and demuxer).
    Generic,
}

/// Declared memory variant of a buffer.
///
/// The engine only relies on the shared storage contract below; the variant
/// tells sinks and hardware codecs how the block may be shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Plain process-local heap memory.
    Virtual,
    /// Memory shared through a file descriptor.
    SharedFd {
        /// The backing descriptor.
        fd: i32,
        /// Offset of this block inside the descriptor.
        offset: u64,
    },
    /// Hardware (DMA) memory identified by an opaque handle.
    Hardware {
        /// Opaque hardware handle.
        handle: u64,
    },
    /// A render surface slot.
    Surface {
        /// Opaque surface handle.
        handle: u64,
    },
}

/// A fixed-capacity memory block with a fill level.
///
/// Invariant: `0 <= size <= capacity`. Writing appends at `size` and grows it
/// up to `capacity`; the stored bytes beyond `size` are unspecified.
pub struct Memory {
    kind: MemoryKind,
    data: Box<[u8]>,
    size: usize,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("capacity", &self.data.len())
            .finish()
    }
}

impl Memory {
    /// Allocate a virtual memory block of the given capacity.
    pub fn new_virtual(capacity: usize) -> Self {
        Self::with_kind(MemoryKind::Virtual, capacity)
    }

    /// Allocate a block of the given capacity with a declared variant.
    pub fn with_kind(kind: MemoryKind, capacity: usize) -> Self {
        Memory {
            kind,
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
        }
    }

    /// Declared memory variant.
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Valid bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Append bytes, growing `size` up to capacity.
    ///
    /// Returns the number of bytes actually written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let room = self.capacity() - self.size;
        let n = room.min(bytes.len());
        self.data[self.size..self.size + n].copy_from_slice(&bytes[..n]);
        self.size += n;
        n
    }

    /// Overwrite the whole payload with `bytes`, truncating to capacity.
    pub fn assign(&mut self, bytes: &[u8]) -> usize {
        self.size = 0;
        self.write(bytes)
    }

    /// Forget the payload. Capacity and contents are untouched.
    pub fn reset(&mut self) {
        self.size = 0;
    }
}

/// Allocator exposed by plugins that own special memory (e.g. DMA).
pub trait BufferAllocator: Send + Sync {
    /// Allocate one memory block of the given capacity.
    fn allocate(&self, capacity: usize) -> Memory;
}

struct VirtualAllocator;

impl BufferAllocator for VirtualAllocator {
    fn allocate(&self, capacity: usize) -> Memory {
        Memory::new_virtual(capacity)
    }
}

/// The default allocator: plain virtual memory.
pub fn null_allocator() -> Arc<dyn BufferAllocator> {
    Arc::new(VirtualAllocator)
}

/// Receiver for memory blocks of dropped pool buffers.
pub trait MemoryReclaimer: Send + Sync {
    /// Take back the memory of a dropped buffer.
    fn reclaim(&self, memory: Memory);
}

/// A media buffer.
pub struct Buffer {
    media_type: MediaType,
    memory: Option<Memory>,
    /// Presentation timestamp in engine ticks.
    pub pts: i64,
    /// Decode timestamp in engine ticks.
    pub dts: i64,
    /// Duration in engine ticks.
    pub duration: i64,
    /// Flag set.
    pub flags: BufferFlags,
    /// Track index assigned by the demuxer.
    pub stream_index: u32,
    reclaim: Option<Arc<dyn MemoryReclaimer>>,
}

impl Buffer {
    /// Create an empty buffer without memory.
    pub fn new(media_type: MediaType) -> Self {
        Buffer {
            media_type,
            memory: None,
            pts: 0,
            dts: 0,
            duration: 0,
            flags: BufferFlags::empty(),
            stream_index: 0,
            reclaim: None,
        }
    }

    /// Create a buffer backed by virtual memory of the given capacity.
    pub fn with_capacity(media_type: MediaType, capacity: usize) -> Self {
        let mut buffer = Buffer::new(media_type);
        buffer.memory = Some(Memory::new_virtual(capacity));
        buffer
    }

    /// Create a buffer around an existing memory block, hooked to a pool.
    pub fn from_pool(media_type: MediaType, memory: Memory, reclaim: Arc<dyn MemoryReclaimer>) -> Self {
        let mut buffer = Buffer::new(media_type);
        buffer.memory = Some(memory);
        buffer.reclaim = Some(reclaim);
        buffer
    }

    /// Create an empty end-of-stream marker buffer.
    pub fn eos(media_type: MediaType) -> Self {
        let mut buffer = Buffer::new(media_type);
        buffer.flags = BufferFlags::EOS;
        buffer
    }

    /// Media classification.
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Borrow the backing memory, if any.
    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// Mutably borrow the backing memory, allocating virtual memory of
    /// `default_capacity` when the buffer has none yet.
    pub fn memory_mut(&mut self, default_capacity: usize) -> &mut Memory {
        self.memory
            .get_or_insert_with(|| Memory::new_virtual(default_capacity))
    }

    /// Number of valid payload bytes.
    pub fn size(&self) -> usize {
        self.memory.as_ref().map_or(0, Memory::size)
    }

    /// Payload capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.memory.as_ref().map_or(0, Memory::capacity)
    }

    /// Valid payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.memory.as_ref().map_or(&[], Memory::as_slice)
    }

    /// Whether the end-of-stream flag is set.
    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }

    /// Clear payload, flags and timestamps; keep memory and pool hook.
    pub fn reset(&mut self) {
        if let Some(memory) = self.memory.as_mut() {
            memory.reset();
        }
        self.pts = 0;
        self.dts = 0;
        self.duration = 0;
        self.flags = BufferFlags::empty();
        self.stream_index = 0;
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("media_type", &self.media_type)
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("pts", &self.pts)
            .field("flags", &self.flags)
            .field("stream_index", &self.stream_index)
            .field("pooled", &self.reclaim.is_some())
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let (Some(reclaim), Some(mut memory)) = (self.reclaim.take(), self.memory.take()) {
            memory.reset();
            reclaim.reclaim(memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_write_grows_to_capacity() {
        let mut memory = Memory::new_virtual(4);
        assert_eq!(memory.write(&[1, 2]), 2);
        assert_eq!(memory.size(), 2);
        assert_eq!(memory.write(&[3, 4, 5]), 2);
        assert_eq!(memory.size(), 4);
        assert_eq!(memory.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(memory.write(&[6]), 0);
    }

    #[test]
    fn test_buffer_reset_keeps_memory() {
        let mut buffer = Buffer::with_capacity(MediaType::Audio, 16);
        buffer.memory_mut(0).write(&[9; 8]);
        buffer.pts = 42;
        buffer.flags = BufferFlags::EOS | BufferFlags::KEY_FRAME;
        buffer.reset();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.pts, 0);
        assert!(buffer.flags.is_empty());
    }

    struct Collector(std::sync::Mutex<Vec<usize>>);

    impl MemoryReclaimer for Collector {
        fn reclaim(&self, memory: Memory) {
            self.0.lock().unwrap().push(memory.capacity());
        }
    }

    #[test]
    fn test_pool_hook_fires_on_drop() {
        let collector = Arc::new(Collector(Default::default()));
        let buffer = Buffer::from_pool(
            MediaType::Generic,
            Memory::new_virtual(32),
            collector.clone(),
        );
        drop(buffer);
        assert_eq!(*collector.0.lock().unwrap(), vec![32]);
    }
}
