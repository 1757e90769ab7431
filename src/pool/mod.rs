//! Buffer pool
//!
//! Reference-counted byte buffers recycled through per-CPU shards.

mod buffer;
mod error;
mod manager;

pub use buffer::{Buffer, BufferKind, ByteBuffer, BytesView};
pub use error::PoolError;
pub use manager::{BufferManager, PoolStats};
