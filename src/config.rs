//! Configuration management
//!
//! Handles loading and validating pool and soak-driver configuration from
//! TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Upper bound on extra handles a soak cycle takes on one buffer
pub const MAX_SHARED_HOLDERS: usize = 4096;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pool: PoolConfig,
    #[serde(default)]
    pub soak: SoakConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Target number of idle buffers across all shards
    #[serde(default = "default_total_buffers")]
    pub total_buffers: usize,
    /// Initial capacity of freshly allocated buffers, in bytes
    #[serde(default = "default_size_hint")]
    pub size_hint: usize,
    /// Number of shards (0 = one per logical CPU)
    #[serde(default)]
    pub shards: usize,
    /// Buffers whose capacity grew beyond this are freed on release
    /// instead of pooled (0 = unlimited)
    #[serde(default)]
    pub max_retained_capacity: usize,
    /// Fill every shard with fresh buffers at construction
    #[serde(default)]
    pub prewarm: bool,
}

impl PoolConfig {
    /// Get effective shard count (auto-detect if 0)
    pub fn effective_shards(&self) -> usize {
        if self.shards == 0 {
            num_cpus::get()
        } else {
            self.shards
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            total_buffers: default_total_buffers(),
            size_hint: default_size_hint(),
            shards: 0,
            max_retained_capacity: 0,
            prewarm: false,
        }
    }
}

/// Soak driver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SoakConfig {
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub workers: usize,
    /// Bytes written into each acquired buffer
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Extra handles taken on each buffer before it is released
    #[serde(default = "default_shared_holders")]
    pub shared_holders: usize,
    /// Iterations per worker before it stops (0 = run until shutdown)
    #[serde(default)]
    pub max_iterations: u64,
    /// Interval between pool statistics log lines
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

impl SoakConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            payload_size: default_payload_size(),
            shared_holders: default_shared_holders(),
            max_iterations: 0,
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_total_buffers() -> usize { 1024 }
fn default_size_hint() -> usize { 4096 }
fn default_payload_size() -> usize { 1024 }
fn default_shared_holders() -> usize { 2 }
fn default_report_interval() -> u64 { 5 }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.pool.total_buffers == 0 {
            anyhow::bail!("total_buffers must be > 0");
        }
        if self.pool.size_hint == 0 {
            anyhow::bail!("size_hint must be > 0");
        }
        if self.pool.max_retained_capacity != 0
            && self.pool.max_retained_capacity < self.pool.size_hint
        {
            anyhow::bail!("max_retained_capacity must be 0 or >= size_hint");
        }
        if self.soak.shared_holders > MAX_SHARED_HOLDERS {
            anyhow::bail!("shared_holders must be <= {}", MAX_SHARED_HOLDERS);
        }
        if self.soak.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be > 0");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!(
                "logging format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            );
        }
        Ok(())
    }
}
