//! bufcache - sharded pool of reusable byte buffers
//!
//! Buffers are shared through explicitly counted handles and go back to a
//! per-CPU shard when the last handle is released. Caller-owned bytes can
//! be wrapped behind the same handle type without ever entering the pool.
//!
//! ```
//! use bufcache::pool::{BufferManager, ByteBuffer};
//!
//! let pool = BufferManager::new(64, 4096).unwrap();
//!
//! let buf = pool.acquire();
//! buf.write(b"hello").unwrap();
//!
//! let shared = buf.increment();
//! assert_eq!(buf.ref_count(), 2);
//! assert_eq!(&*shared.bytes(), b"hello");
//!
//! drop(shared);
//! buf.decrement(); // last handle: reset and returned to a shard
//! ```

pub mod config;
pub mod metrics;
pub mod pool;
pub mod soak;
pub mod util;

pub use config::Config;
pub use pool::{Buffer, BufferManager, ByteBuffer};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
