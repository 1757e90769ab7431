//! Pool construction errors

use thiserror::Error;

/// Reasons a [`BufferManager`](super::BufferManager) cannot be built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// `total_buffers` was zero
    #[error("total buffer count must be > 0")]
    ZeroBufferCount,
    /// `size_hint` was zero
    #[error("buffer size hint must be > 0")]
    ZeroSizeHint,
    /// `max_retained_capacity` was set below `size_hint`, so no buffer
    /// could ever be recycled
    #[error("max retained capacity {limit} is below the size hint {size_hint}")]
    RetentionBelowSizeHint { limit: usize, size_hint: usize },
}
