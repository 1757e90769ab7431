//! Fault-tolerant reads into a buffer
//!
//! [`read_all`] drains a reader into a buffer. Declared I/O errors are
//! logged and returned. A panic raised while reading is logged and
//! swallowed, so the caller sees `Ok(())` and only the log shows the fault.

use std::any::Any;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

use crate::metrics::METRICS;
use crate::pool::ByteBuffer;

/// Read everything from `src` into `dest`
///
/// Buffer storage uses a non-poisoning lock, so `dest` stays usable after
/// a fault. Whatever was read before the fault is kept.
pub fn read_all<B, R>(dest: &B, src: &mut R) -> io::Result<()>
where
    B: ByteBuffer + ?Sized,
    R: Read + ?Sized,
{
    // `&mut R` is always sized, so it coerces to `&mut dyn Read` even when `R` is not
    let mut src = src;
    match panic::catch_unwind(AssertUnwindSafe(|| dest.read_from(&mut src))) {
        Ok(Ok(bytes)) => {
            METRICS.read_ok(bytes);
            Ok(())
        }
        Ok(Err(e)) => {
            METRICS.read_error();
            warn!(error = %e, "Read into buffer failed");
            Err(e)
        }
        Err(payload) => {
            METRICS.read_fault();
            error!(
                fault = panic_message(payload.as_ref()),
                "Recovered from fault while reading into buffer"
            );
            Ok(())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferManager;
    use tracing_test::traced_test;

    struct PanickingReader;

    impl Read for PanickingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("reader blew up");
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[traced_test]
    #[test]
    fn test_read_all_success() {
        let pool = BufferManager::new(4, 64).unwrap();
        let buf = pool.acquire();
        let before = METRICS.snapshot();

        read_all(&buf, &mut &b"payload"[..]).unwrap();

        assert_eq!(&*buf.bytes(), b"payload");
        let after = METRICS.snapshot();
        assert!(after.bytes_read >= before.bytes_read + 7);
    }

    #[traced_test]
    #[test]
    fn test_read_all_accepts_trait_object_reader() {
        let pool = BufferManager::new(4, 64).unwrap();
        let buf = pool.acquire();
        let mut source: &[u8] = b"dynamic";
        let reader: &mut dyn Read = &mut source;

        read_all(&buf, reader).unwrap();

        assert_eq!(&*buf.bytes(), b"dynamic");
    }

    #[traced_test]
    #[test]
    fn test_read_all_returns_io_error() {
        let pool = BufferManager::new(4, 64).unwrap();
        let buf = pool.acquire();

        let err = read_all(&buf, &mut BrokenPipe).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(logs_contain("Read into buffer failed"));
        assert!(logs_contain("pipe closed"));
    }

    #[traced_test]
    #[test]
    fn test_read_all_swallows_fault() {
        let pool = BufferManager::new(4, 64).unwrap();
        let buf = pool.acquire();
        buf.write(b"kept").unwrap();
        let before = METRICS.snapshot();

        assert!(read_all(&buf, &mut PanickingReader).is_ok());

        assert!(logs_contain("Recovered from fault while reading into buffer"));
        assert!(logs_contain("reader blew up"));
        assert!(METRICS.snapshot().read_faults > before.read_faults);

        // Lock is not poisoned and contents survive
        buf.write(b" after").unwrap();
        assert_eq!(&*buf.bytes(), b"kept after");
    }

    #[test]
    fn test_panic_message() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn Any + Send> = Box::new("fixed");
        let other: Box<dyn Any + Send> = Box::new(7u32);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(fixed.as_ref()), "fixed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
