//! Sharded buffer manager
//!
//! Idle buffers live in one bounded lock-free queue per shard. Acquire and
//! release walk the shards with two independent rotating cursors, started
//! half the ring apart, so the two paths rarely contend on the same queue.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::buffer::{Buffer, BufferKind, Slot};
use super::error::PoolError;
use crate::config::PoolConfig;
use crate::metrics::{PoolCounters, PoolCountersSnapshot};

/// Inner manager state (shared across clones, weakly referenced by buffers)
pub(crate) struct ManagerInner {
    shards: Box<[ArrayQueue<Arc<Slot>>]>,
    shard_capacity: usize,
    size_hint: usize,
    max_retained: Option<usize>,
    read: AtomicUsize,
    write: AtomicUsize,
    counters: PoolCounters,
}

impl ManagerInner {
    /// Advance `cursor` and map the new position onto a shard
    #[inline]
    fn next_shard(&self, cursor: &AtomicUsize) -> usize {
        cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % self.shards.len()
    }

    /// Called once per buffer, by the handle that took its count to zero
    pub(crate) fn release(&self, slot: Arc<Slot>) {
        slot.reset();

        if slot.kind() == BufferKind::Wrapped {
            self.counters.wrapped_released();
            return;
        }

        let capacity = slot.capacity();
        if self.max_retained.is_some_and(|limit| capacity > limit) {
            trace!(capacity, "Discarding oversized buffer");
            self.counters.discarded();
            return;
        }

        // Callers may have split storage off through `get()`
        slot.reserve(self.size_hint);

        let shard = self.next_shard(&self.write);
        match self.shards[shard].push(slot) {
            Ok(()) => self.counters.recycled(),
            Err(_) => {
                trace!(shard, "Shard full, dropping buffer");
                self.counters.overflow();
            }
        }
    }
}

/// Sharded pool of reusable byte buffers
///
/// Cheap to clone; all clones share the same shards.
#[derive(Clone)]
pub struct BufferManager {
    inner: Arc<ManagerInner>,
}

impl BufferManager {
    /// Create a manager with one shard per logical CPU
    ///
    /// Each shard holds up to `total_buffers / shards` idle buffers, and at
    /// least one. Fresh buffers start with `size_hint` bytes of capacity.
    pub fn new(total_buffers: usize, size_hint: usize) -> Result<Self, PoolError> {
        Self::from_config(&PoolConfig {
            total_buffers,
            size_hint,
            ..PoolConfig::default()
        })
    }

    /// Create a manager from configuration
    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.total_buffers == 0 {
            return Err(PoolError::ZeroBufferCount);
        }
        if config.size_hint == 0 {
            return Err(PoolError::ZeroSizeHint);
        }
        if config.max_retained_capacity != 0 && config.max_retained_capacity < config.size_hint {
            return Err(PoolError::RetentionBelowSizeHint {
                limit: config.max_retained_capacity,
                size_hint: config.size_hint,
            });
        }

        let shard_count = config.effective_shards();
        let shard_capacity = (config.total_buffers / shard_count).max(1);

        let shards: Vec<ArrayQueue<Arc<Slot>>> = (0..shard_count)
            .map(|_| ArrayQueue::new(shard_capacity))
            .collect();

        let inner = ManagerInner {
            shards: shards.into_boxed_slice(),
            shard_capacity,
            size_hint: config.size_hint,
            max_retained: (config.max_retained_capacity > 0)
                .then_some(config.max_retained_capacity),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(shard_count / 2),
            counters: PoolCounters::default(),
        };

        let manager = Self {
            inner: Arc::new(inner),
        };

        debug!(
            shards = shard_count,
            shard_capacity,
            size_hint = config.size_hint,
            "Buffer manager created"
        );

        if config.prewarm {
            manager.prewarm();
        }

        Ok(manager)
    }

    /// Get a buffer, recycled if the next shard has one, fresh otherwise
    ///
    /// Never blocks. The returned buffer is empty, has one reference, and
    /// has at least `size_hint` bytes of capacity.
    pub fn acquire(&self) -> Buffer {
        let shard = self.inner.next_shard(&self.inner.read);

        match self.inner.shards[shard].pop() {
            Some(slot) => {
                self.inner.counters.hit();
                Buffer::attach(slot)
            }
            None => {
                self.inner.counters.miss();
                Buffer::attach(Arc::new(self.fresh_slot()))
            }
        }
    }

    /// Adopt caller-owned bytes as a buffer that is never pooled
    pub fn wrap(&self, data: Vec<u8>) -> Buffer {
        Buffer::attach(Arc::new(Slot::wrapped(data, Arc::downgrade(&self.inner))))
    }

    /// Fill every shard with fresh buffers
    ///
    /// Returns the number of buffers allocated.
    pub fn prewarm(&self) -> usize {
        let mut allocated = 0;
        for shard in self.inner.shards.iter() {
            while !shard.is_full() {
                if shard.push(Arc::new(self.fresh_slot())).is_err() {
                    break;
                }
                allocated += 1;
            }
        }

        debug!(allocated, "Buffer manager prewarmed");
        allocated
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle_per_shard: Vec<usize> = self.inner.shards.iter().map(ArrayQueue::len).collect();

        PoolStats {
            shards: self.inner.shards.len(),
            shard_capacity: self.inner.shard_capacity,
            size_hint: self.inner.size_hint,
            idle: idle_per_shard.iter().sum(),
            idle_per_shard,
            counters: self.inner.counters.snapshot(),
        }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Initial capacity of fresh buffers
    pub fn size_hint(&self) -> usize {
        self.inner.size_hint
    }

    fn fresh_slot(&self) -> Slot {
        Slot::new(
            BytesMut::with_capacity(self.inner.size_hint),
            BufferKind::Reusable,
            Arc::downgrade(&self.inner),
        )
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("shards", &self.inner.shards.len())
            .field("shard_capacity", &self.inner.shard_capacity)
            .field("size_hint", &self.inner.size_hint)
            .finish()
    }
}

/// Buffer pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub shards: usize,
    pub shard_capacity: usize,
    pub size_hint: usize,
    /// Idle buffers across all shards
    pub idle: usize,
    pub idle_per_shard: Vec<usize>,
    pub counters: PoolCountersSnapshot,
}
