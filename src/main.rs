//! bufcache soak driver - Entry Point
//!
//! Runs the buffer lifecycle from worker threads against one shared pool,
//! reporting pool statistics until shutdown.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use bufcache::pool::BufferManager;
use bufcache::soak::{log_stats, SoakRunner};
use bufcache::{Config, VERSION};

/// Application entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bufcache.toml"));

    // Load configuration
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize tracing/logging
    bufcache::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting bufcache soak driver"
    );

    let manager = BufferManager::from_config(&config.pool).context("Failed to build buffer pool")?;

    info!(
        shards = manager.shard_count(),
        size_hint = manager.size_hint(),
        workers = config.soak.effective_workers(),
        "Buffer pool ready"
    );

    // Initialize metrics if enabled
    if config.metrics.enabled {
        bufcache::metrics::init_metrics(&config.metrics, manager.clone())?;
        info!(
            bind_addr = %config.metrics.bind_addr,
            "Metrics endpoint started"
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    let runner = SoakRunner::new(manager.clone(), config.soak.clone());

    let mut soak = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || runner.run(&stop)
    });

    let reporter = tokio::spawn(report_stats(
        manager.clone(),
        Duration::from_secs(config.soak.report_interval_secs),
    ));

    let report = tokio::select! {
        joined = &mut soak => joined.context("Soak workers aborted")?,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping workers...");
            stop.store(true, Ordering::Relaxed);
            soak.await.context("Soak workers aborted")?
        }
    };

    reporter.abort();
    log_stats(&manager);

    if report.failures > 0 {
        warn!(failures = report.failures, "Soak run saw lifecycle failures");
        anyhow::bail!("{} of {} soak iterations failed", report.failures, report.iterations);
    }

    info!(iterations = report.iterations, "Soak driver stopped");
    Ok(())
}

/// Log pool statistics on a fixed interval
async fn report_stats(manager: BufferManager, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        log_stats(&manager);
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
