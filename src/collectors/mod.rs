pub mod network;
pub mod process;
pub mod services;
pub mod system;

use async_trait::async_trait;
use network::{PingOutcome, PortState};
use std::time::Duration;
use sysinfo::{System, SystemExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}: not supported on this platform")]
    Unsupported(&'static str),
    #[error("access to {target} failed: {source}")]
    Access {
        target: String,
        source: std::io::Error,
    },
    #[error("probe task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub device: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
}

/// Raw host metrics as the OS reports them. Policy (thresholds, skipping,
/// percent math) lives in the probe functions that call this.
pub trait HostMetrics: Send + Sync {
    /// Blocks for `window` and returns utilization averaged over it.
    fn cpu_percent(&self, window: Duration) -> Result<f64, ProbeError>;

    fn memory(&self) -> Result<MemoryCounters, ProbeError>;

    fn partitions(&self) -> Result<Vec<Partition>, ProbeError>;

    fn partition_usage(&self, partition: &Partition) -> Result<PartitionUsage, ProbeError>;
}

pub trait ProcessTable: Send + Sync {
    fn process_names(&self) -> Result<Vec<String>, ProbeError>;
}

#[async_trait]
pub trait NetworkProber: Send + Sync {
    async fn ping(&self, host: &str) -> PingOutcome;

    async fn connect(&self, host: &str, port: u16) -> PortState;
}

pub(crate) fn ensure_supported(category: &'static str) -> Result<(), ProbeError> {
    if System::IS_SUPPORTED {
        Ok(())
    } else {
        Err(ProbeError::Unsupported(category))
    }
}
