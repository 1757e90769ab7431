//! Reference-counted buffer handles
//!
//! A [`Buffer`] is one owning handle to shared, growable byte storage.
//! Handles are counted explicitly: [`ByteBuffer::increment`] mints a new
//! handle, dropping or [`ByteBuffer::decrement`]ing one gives it back, and
//! whoever takes the count to zero hands the storage to the pool's release
//! path exactly once.

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use super::manager::ManagerInner;

/// Locked view of a buffer's contents
pub type BytesView<'a> = MappedMutexGuard<'a, [u8]>;

/// Where a buffer's storage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Allocated by the pool, recycled into a shard on release
    Reusable,
    /// Adopted from caller-supplied bytes, reset on release and never pooled
    Wrapped,
}

/// Operations every buffer handle supports
///
/// Content operations take the storage lock for their own duration only.
/// Holding a [`BytesView`] or the [`get`](ByteBuffer::get) guard while
/// calling another content operation on the same buffer deadlocks.
pub trait ByteBuffer: Send + Sync {
    /// Truncate to empty, keeping the allocated capacity
    fn reset(&self);

    /// Current contents
    fn bytes(&self) -> BytesView<'_>;

    /// Append everything `src` yields until EOF
    ///
    /// Bytes read before an error stay in the buffer.
    fn read_from(&self, src: &mut dyn Read) -> io::Result<u64>;

    /// Append `data`
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Mutable access to the underlying storage
    fn get(&self) -> MutexGuard<'_, BytesMut>;

    /// New owning handle to the same storage
    fn increment(&self) -> Self
    where
        Self: Sized;

    /// Give this handle back
    fn decrement(self)
    where
        Self: Sized;
}

/// Shared state behind every handle to one buffer
pub(crate) struct Slot {
    data: Mutex<BytesMut>,
    refs: AtomicI32,
    kind: BufferKind,
    pool: Weak<ManagerInner>,
}

impl Slot {
    /// Create an unreferenced slot; it is live once [`Buffer::attach`]ed
    pub(crate) fn new(data: BytesMut, kind: BufferKind, pool: Weak<ManagerInner>) -> Self {
        Self {
            data: Mutex::new(data),
            refs: AtomicI32::new(0),
            kind,
            pool,
        }
    }

    pub(crate) fn wrapped(data: Vec<u8>, pool: Weak<ManagerInner>) -> Self {
        Self::new(BytesMut::from(Bytes::from(data)), BufferKind::Wrapped, pool)
    }

    pub(crate) fn kind(&self) -> BufferKind {
        self.kind
    }

    pub(crate) fn reset(&self) {
        self.data.lock().clear();
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.lock().capacity()
    }

    /// Make sure an empty buffer can take `min` bytes without growing
    pub(crate) fn reserve(&self, min: usize) {
        let mut data = self.data.lock();
        if data.capacity() < min {
            data.reserve(min);
        }
    }

    pub(crate) fn ref_count(&self) -> i32 {
        self.refs.load(Ordering::Acquire)
    }
}

/// An owning handle to a pooled or wrapped byte buffer
///
/// Cloning is [`ByteBuffer::increment`]. Dropping is
/// [`ByteBuffer::decrement`].
pub struct Buffer {
    slot: Arc<Slot>,
}

impl Buffer {
    /// Take a new reference on `slot`
    pub(crate) fn attach(slot: Arc<Slot>) -> Self {
        slot.refs.fetch_add(1, Ordering::AcqRel);
        Self { slot }
    }

    /// Number of live handles to this buffer
    pub fn ref_count(&self) -> i32 {
        self.slot.ref_count()
    }

    /// Where the storage came from
    pub fn kind(&self) -> BufferKind {
        self.slot.kind
    }

    /// Check whether both handles share the same storage
    pub fn same_storage(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    pub fn len(&self) -> usize {
        self.slot.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated capacity of the storage
    pub fn capacity(&self) -> usize {
        self.slot.capacity()
    }
}

impl ByteBuffer for Buffer {
    fn reset(&self) {
        self.slot.reset();
    }

    fn bytes(&self) -> BytesView<'_> {
        MutexGuard::map(self.slot.data.lock(), |data| &mut data[..])
    }

    fn read_from(&self, src: &mut dyn Read) -> io::Result<u64> {
        let mut data = self.slot.data.lock();
        io::copy(src, &mut (&mut *data).writer())
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.slot.data.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn get(&self) -> MutexGuard<'_, BytesMut> {
        self.slot.data.lock()
    }

    fn increment(&self) -> Self {
        Self::attach(Arc::clone(&self.slot))
    }

    fn decrement(self) {
        drop(self);
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        self.increment()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.slot.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // Last handle: the storage is no longer reachable by anyone else
        match self.slot.pool.upgrade() {
            Some(pool) => pool.release(Arc::clone(&self.slot)),
            None => self.slot.reset(),
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Buffer");
        s.field("kind", &self.slot.kind)
            .field("refs", &self.ref_count());
        // try_lock: Debug must not deadlock against a held view
        if let Some(data) = self.slot.data.try_lock() {
            s.field("len", &data.len()).field("capacity", &data.capacity());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferManager;

    struct FailingReader {
        chunk: &'static [u8],
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
            }
            self.served = true;
            buf[..self.chunk.len()].copy_from_slice(self.chunk);
            Ok(self.chunk.len())
        }
    }

    /// Interrupted on the first call, then one chunk, then EOF
    struct InterruptedOnce {
        chunk: &'static [u8],
        calls: usize,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
                2 => {
                    buf[..self.chunk.len()].copy_from_slice(self.chunk);
                    Ok(self.chunk.len())
                }
                _ => Ok(0),
            }
        }
    }

    fn manager() -> BufferManager {
        BufferManager::new(8, 64).unwrap()
    }

    #[test]
    fn test_wrap_round_trip() {
        let pool = manager();
        let buf = pool.wrap(b"hello world".to_vec());

        assert_eq!(buf.kind(), BufferKind::Wrapped);
        assert_eq!(buf.ref_count(), 1);
        assert_eq!(&*buf.bytes(), b"hello world");

        buf.reset();
        assert!(buf.bytes().is_empty());
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let pool = manager();
        let buf = pool.acquire();
        buf.write(&[7u8; 200]).unwrap();
        let capacity = buf.capacity();
        assert!(capacity >= 200);

        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);

        let ptr = buf.get().as_ptr();
        buf.write(&[1u8; 200]).unwrap();
        assert_eq!(buf.get().as_ptr(), ptr);
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_increment_shares_storage() {
        let pool = manager();
        let a = pool.acquire();
        let b = a.increment();
        let c = b.clone();

        assert!(a.same_storage(&b));
        assert!(a.same_storage(&c));
        assert_eq!(a.ref_count(), 3);

        b.write(b"abc").unwrap();
        assert_eq!(&*a.bytes(), b"abc");

        c.decrement();
        assert_eq!(a.ref_count(), 2);
        drop(b);
        assert_eq!(a.ref_count(), 1);
        assert_eq!(&*a.bytes(), b"abc");
    }

    #[test]
    fn test_read_from_grows() {
        let pool = manager();
        let buf = pool.acquire();
        let payload = vec![42u8; 10_000];

        let n = buf.read_from(&mut payload.as_slice()).unwrap();
        assert_eq!(n, 10_000);
        assert_eq!(buf.len(), 10_000);
        assert!(buf.capacity() >= 10_000);
        assert_eq!(&*buf.bytes(), payload.as_slice());
    }

    #[test]
    fn test_read_from_retries_interrupted() {
        let pool = manager();
        let buf = pool.acquire();
        let mut reader = InterruptedOnce { chunk: b"after signal", calls: 0 };

        let n = buf.read_from(&mut reader).unwrap();
        assert_eq!(n, 12);
        assert_eq!(&*buf.bytes(), b"after signal");
        assert_eq!(reader.calls, 3);
    }

    #[test]
    fn test_read_from_error_keeps_partial_data() {
        let pool = manager();
        let buf = pool.acquire();
        let mut reader = FailingReader { chunk: b"partial", served: false };

        let err = buf.read_from(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(&*buf.bytes(), b"partial");
    }

    #[test]
    fn test_get_exposes_storage() {
        let pool = manager();
        let buf = pool.acquire();
        {
            let mut data = buf.get();
            data.extend_from_slice(b"xyz");
            data[0] = b'X';
        }
        assert_eq!(&*buf.bytes(), b"Xyz");
    }

    #[test]
    fn test_buffer_outlives_pool() {
        let pool = manager();
        let pooled = pool.acquire();
        let wrapped = pool.wrap(vec![1, 2, 3]);
        let kept = wrapped.clone();
        drop(pool);

        pooled.write(b"still usable").unwrap();
        drop(pooled);
        drop(wrapped);

        assert_eq!(kept.ref_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_debug_does_not_block_on_held_view() {
        let pool = manager();
        let buf = pool.acquire();
        let view = buf.bytes();
        let rendered = format!("{:?}", buf);
        drop(view);

        assert!(rendered.contains("Reusable"));
        assert!(!rendered.contains("len"));
    }
}
