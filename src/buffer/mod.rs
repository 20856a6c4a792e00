//! Zero-allocation hot-path primitives: chunked buffers and slab storage.

mod io_buffer;
pub use io_buffer::{IoBuffer, DEFAULT_CHUNK_SIZE};
