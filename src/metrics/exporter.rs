//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use super::counters::{MetricsSnapshot, PoolCountersSnapshot, METRICS};
use crate::config::MetricsConfig;
use crate::pool::BufferManager;

/// Initialize the Prometheus metrics exporter
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig, manager: BufferManager) -> Result<()> {
    describe_counter!("bufcache_acquires_total", "Buffers handed out");
    describe_counter!("bufcache_hits_total", "Acquires served from a shard");
    describe_counter!("bufcache_misses_total", "Acquires that allocated a fresh buffer");
    describe_counter!("bufcache_releases_total", "Buffers whose last handle was released");
    describe_counter!("bufcache_recycled_total", "Released buffers returned to a shard");
    describe_counter!(
        "bufcache_overflow_drops_total",
        "Released buffers dropped because the shard was full"
    );
    describe_counter!(
        "bufcache_discarded_total",
        "Released buffers dropped for exceeding the retention limit"
    );
    describe_counter!("bufcache_wrapped_releases_total", "Wrapped buffers released");
    describe_gauge!("bufcache_idle_buffers", "Idle buffers across all shards");
    describe_counter!("bufcache_reads_total", "Guarded reads");
    describe_counter!("bufcache_read_errors_total", "Guarded reads that returned an I/O error");
    describe_counter!("bufcache_read_faults_total", "Guarded reads that recovered from a fault");
    describe_counter!("bufcache_bytes_read_total", "Bytes read by guarded reads");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    tokio::spawn(sync_metrics_task(manager));

    Ok(())
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task(manager: BufferManager) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    let mut last_pool = PoolCountersSnapshot::default();
    let mut last_reads = MetricsSnapshot::default();

    loop {
        interval.tick().await;

        let stats = manager.stats();
        let pool = stats.counters;
        let reads = METRICS.snapshot();

        gauge!("bufcache_idle_buffers").set(stats.idle as f64);

        publish("bufcache_acquires_total", pool.acquires, last_pool.acquires);
        publish("bufcache_hits_total", pool.hits, last_pool.hits);
        publish("bufcache_misses_total", pool.misses, last_pool.misses);
        publish("bufcache_releases_total", pool.releases, last_pool.releases);
        publish("bufcache_recycled_total", pool.recycled, last_pool.recycled);
        publish("bufcache_overflow_drops_total", pool.overflow_drops, last_pool.overflow_drops);
        publish("bufcache_discarded_total", pool.discarded, last_pool.discarded);
        publish(
            "bufcache_wrapped_releases_total",
            pool.wrapped_releases,
            last_pool.wrapped_releases,
        );

        publish("bufcache_reads_total", reads.reads_total, last_reads.reads_total);
        publish("bufcache_read_errors_total", reads.read_errors, last_reads.read_errors);
        publish("bufcache_read_faults_total", reads.read_faults, last_reads.read_faults);
        publish("bufcache_bytes_read_total", reads.bytes_read, last_reads.bytes_read);

        last_pool = pool;
        last_reads = reads;
    }
}

#[inline]
fn publish(name: &'static str, current: u64, last: u64) {
    let delta = current.saturating_sub(last);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}
