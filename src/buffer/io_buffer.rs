//! Chunked, scatter-gather byte buffer.
//!
//! Grounded on the original `holytls` `src/base/buffer.h`/`src/core/io_buffer.cc`:
//! an ordered sequence of fixed-capacity chunks with `start`/`end` cursors.
//! Appends extend the last chunk or grow a new one; reads consume from the
//! front, releasing empty chunks so memory doesn't accumulate across a
//! long-lived connection.

use std::collections::VecDeque;
use std::io::IoSlice;

/// Default chunk capacity, matching the original's 16 KiB chunks.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

struct Chunk {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    fn readable(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    fn writable_capacity(&self) -> usize {
        self.data.len() - self.end
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunked byte buffer supporting O(1) amortized append/read and
/// zero-copy scatter-gather views for vectored I/O.
pub struct IoBuffer {
    chunks: VecDeque<Chunk>,
    chunk_size: usize,
    size: usize,
}

impl IoBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            chunk_size,
            size: 0,
        }
    }

    /// Total readable bytes across all chunks.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Appends `data`, extending the last chunk when it has room, or
    /// allocating new chunks as needed.
    pub fn append(&mut self, mut data: &[u8]) {
        self.size += data.len();

        while !data.is_empty() {
            if self.chunks.back().map(|c| c.writable_capacity()).unwrap_or(0) == 0 {
                self.chunks.push_back(Chunk::new(self.chunk_size.max(data.len().min(self.chunk_size))));
            }
            let chunk = self.chunks.back_mut().unwrap();
            let room = chunk.writable_capacity();
            let n = room.min(data.len());
            chunk.data[chunk.end..chunk.end + n].copy_from_slice(&data[..n]);
            chunk.end += n;
            data = &data[n..];
        }
    }

    /// Consumes up to `n` bytes from the front, returning them as an owned
    /// `Vec`. Returns fewer than `n` bytes only if the buffer holds less.
    /// Empty chunks are released as they're fully consumed.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.size);
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;

        while remaining > 0 {
            let chunk = self.chunks.front_mut().expect("size accounting invariant");
            let avail = chunk.end - chunk.start;
            let take = avail.min(remaining);
            out.extend_from_slice(&chunk.data[chunk.start..chunk.start + take]);
            chunk.start += take;
            remaining -= take;

            if chunk.is_empty() {
                self.chunks.pop_front();
            }
        }

        self.size -= n;
        out
    }

    /// Returns scatter-gather `IoSlice` views over the readable bytes,
    /// without copying, for vectored writes.
    pub fn iovecs(&self) -> Vec<IoSlice<'_>> {
        self.chunks.iter().map(|c| IoSlice::new(c.readable())).collect()
    }

    /// Coalesces the buffer into a single contiguous `Vec<u8>` and clears
    /// it — the "TakeContiguous" operation from the original design.
    pub fn take_contiguous(&mut self) -> Vec<u8> {
        let n = self.size;
        self.read(n)
    }

    /// Discards `n` bytes from the front without copying them out.
    pub fn drain(&mut self, n: usize) {
        let n = n.min(self.size);
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.chunks.front_mut().expect("size accounting invariant");
            let avail = chunk.end - chunk.start;
            let take = avail.min(remaining);
            chunk.start += take;
            remaining -= take;
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
        }
        self.size -= n;
    }

    /// Number of chunks currently held (test/diagnostic visibility).
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Default for IoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_all_drains_buffer() {
        let mut buf = IoBuffer::new();
        let data = b"hello world";
        buf.append(data);
        assert_eq!(buf.len(), data.len());
        let read = buf.read(data.len());
        assert_eq!(read, data);
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_reads_preserve_order() {
        let mut buf = IoBuffer::new();
        buf.append(b"abcdef");
        assert_eq!(buf.read(3), b"abc");
        assert_eq!(buf.read(3), b"def");
        assert!(buf.is_empty());
    }

    #[test]
    fn append_spanning_multiple_chunks() {
        let mut buf = IoBuffer::with_chunk_size(4);
        buf.append(b"0123456789");
        assert_eq!(buf.len(), 10);
        assert!(buf.chunk_count() >= 3);
        assert_eq!(buf.read(10), b"0123456789");
    }

    #[test]
    fn read_more_than_available_returns_all() {
        let mut buf = IoBuffer::new();
        buf.append(b"abc");
        let read = buf.read(100);
        assert_eq!(read, b"abc");
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn take_contiguous_coalesces_chunks() {
        let mut buf = IoBuffer::with_chunk_size(4);
        buf.append(b"0123456789");
        let all = buf.take_contiguous();
        assert_eq!(all, b"0123456789");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_chunks_are_released_after_full_consumption() {
        let mut buf = IoBuffer::with_chunk_size(4);
        buf.append(b"01234567");
        assert_eq!(buf.chunk_count(), 2);
        buf.read(4);
        assert_eq!(buf.chunk_count(), 1);
    }

    #[test]
    fn drain_discards_without_copy() {
        let mut buf = IoBuffer::new();
        buf.append(b"abcdef");
        buf.drain(2);
        assert_eq!(buf.read(4), b"cdef");
    }
}
