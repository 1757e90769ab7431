//! Soak driver
//!
//! Worker threads run the full buffer lifecycle against a shared
//! [`BufferManager`] until stopped: acquire or wrap, fill, share across
//! extra handles, verify, release.

use anyhow::{ensure, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, info_span, warn};

use crate::config::SoakConfig;
use crate::pool::{Buffer, BufferManager, ByteBuffer};
use crate::util::read_all;

/// Every this-many iterations a worker wraps its payload instead of acquiring
const WRAP_EVERY: u64 = 16;

/// Outcome of a soak run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoakReport {
    pub iterations: u64,
    pub failures: u64,
}

impl SoakReport {
    fn merge(self, other: SoakReport) -> SoakReport {
        SoakReport {
            iterations: self.iterations + other.iterations,
            failures: self.failures + other.failures,
        }
    }
}

/// Drives worker threads against a buffer manager
pub struct SoakRunner {
    manager: BufferManager,
    config: SoakConfig,
}

impl SoakRunner {
    pub fn new(manager: BufferManager, config: SoakConfig) -> Self {
        Self { manager, config }
    }

    /// Run workers until `stop` is set or each reaches `max_iterations`
    pub fn run(&self, stop: &AtomicBool) -> SoakReport {
        let workers = self.config.effective_workers();
        let payload: Vec<u8> = (0..self.config.payload_size)
            .map(|i| (i % 251) as u8)
            .collect();

        info!(
            workers,
            payload_size = self.config.payload_size,
            shared_holders = self.config.shared_holders,
            "Soak run starting"
        );

        let report = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let payload = payload.as_slice();
                    scope.spawn(move || self.worker(id, payload, stop))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        warn!("Soak worker panicked");
                        SoakReport { iterations: 0, failures: 1 }
                    })
                })
                .fold(SoakReport::default(), SoakReport::merge)
        });

        info!(
            iterations = report.iterations,
            failures = report.failures,
            "Soak run finished"
        );
        report
    }

    fn worker(&self, id: usize, payload: &[u8], stop: &AtomicBool) -> SoakReport {
        let _span = info_span!("soak_worker", id).entered();
        let mut report = SoakReport::default();

        while !stop.load(Ordering::Relaxed) {
            if self.config.max_iterations != 0 && report.iterations >= self.config.max_iterations {
                break;
            }

            if let Err(e) = self.cycle(report.iterations, payload) {
                report.failures += 1;
                warn!(error = %e, iteration = report.iterations, "Soak cycle failed");
            }
            report.iterations += 1;
        }

        debug!(iterations = report.iterations, failures = report.failures, "Soak worker finished");
        report
    }

    fn cycle(&self, iteration: u64, payload: &[u8]) -> Result<()> {
        let expected = i32::try_from(self.config.shared_holders)
            .ok()
            .and_then(|holders| holders.checked_add(1))
            .with_context(|| {
                format!(
                    "{} shared holders overflow the reference count",
                    self.config.shared_holders
                )
            })?;

        let buf = if iteration % WRAP_EVERY == WRAP_EVERY - 1 {
            self.manager.wrap(payload.to_vec())
        } else {
            let buf = self.manager.acquire();
            ensure!(buf.is_empty(), "acquired buffer holds {} stale bytes", buf.len());
            ensure!(buf.ref_count() == 1, "acquired buffer has {} references", buf.ref_count());

            if iteration % 2 == 0 {
                buf.write(payload)?;
            } else {
                read_all(&buf, &mut &payload[..])?;
            }
            buf
        };

        let holders: Vec<Buffer> = (0..self.config.shared_holders)
            .map(|_| buf.increment())
            .collect();

        ensure!(
            buf.ref_count() == expected,
            "expected {} references, found {}",
            expected,
            buf.ref_count()
        );

        for holder in &holders {
            ensure!(holder.same_storage(&buf), "shared handle points at different storage");
            ensure!(&*holder.bytes() == payload, "shared handle sees different contents");
        }

        drop(holders);
        ensure!(buf.ref_count() == 1, "{} references left after sharing", buf.ref_count());

        buf.decrement();
        Ok(())
    }
}

/// Log a one-line summary of pool statistics
pub fn log_stats(manager: &BufferManager) {
    let stats = manager.stats();
    let c = stats.counters;
    info!(
        idle = stats.idle,
        acquires = c.acquires,
        hits = c.hits,
        misses = c.misses,
        recycled = c.recycled,
        overflow_drops = c.overflow_drops,
        discarded = c.discarded,
        wrapped_releases = c.wrapped_releases,
        "Pool stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn soak_config(workers: usize, max_iterations: u64) -> SoakConfig {
        SoakConfig {
            workers,
            payload_size: 300,
            shared_holders: 3,
            max_iterations,
            ..SoakConfig::default()
        }
    }

    #[test]
    fn test_bounded_run() {
        let manager = BufferManager::from_config(&PoolConfig {
            total_buffers: 16,
            size_hint: 128,
            shards: 4,
            ..PoolConfig::default()
        })
        .unwrap();
        let runner = SoakRunner::new(manager.clone(), soak_config(4, 50));

        let report = runner.run(&AtomicBool::new(false));

        assert_eq!(report, SoakReport { iterations: 200, failures: 0 });

        // Iterations 15, 31 and 47 of each worker wrap instead of acquiring
        let counters = manager.stats().counters;
        assert_eq!(counters.wrapped_releases, 12);
        assert_eq!(counters.acquires, 188);
        assert_eq!(counters.releases, 200);
        assert!(counters.hits > 0);
    }

    #[test]
    fn test_oversized_holder_count_fails_cycle() {
        let manager = BufferManager::new(8, 64).unwrap();
        let config = SoakConfig {
            shared_holders: usize::MAX,
            ..soak_config(1, 3)
        };
        let runner = SoakRunner::new(manager.clone(), config);

        let report = runner.run(&AtomicBool::new(false));

        assert_eq!(report, SoakReport { iterations: 3, failures: 3 });
        assert_eq!(manager.stats().counters.acquires, 0);
    }

    #[test]
    fn test_stop_flag_halts_workers() {
        let manager = BufferManager::new(8, 64).unwrap();
        let runner = SoakRunner::new(manager.clone(), soak_config(2, 0));

        let report = runner.run(&AtomicBool::new(true));

        assert_eq!(report, SoakReport::default());
        assert_eq!(manager.stats().counters.acquires, 0);
    }
}
