use crate::collectors::ProbeError;
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub generated_at: String,
    pub cpu: CategoryOutcome<CpuResult>,
    pub memory: CategoryOutcome<MemoryResult>,
    pub disk: CategoryOutcome<Vec<DiskEntry>>,
    pub process: CategoryOutcome<ProcessResult>,
    pub network: CategoryOutcome<NetworkResult>,
    pub services: CategoryOutcome<ServiceResults>,
}

/// Result of one report category: either what the probe saw, or a marker that
/// the category could not be checked at all. A checked-but-empty category
/// (no disks, no services configured) is still `Checked`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CategoryOutcome<T> {
    Checked(T),
    Unavailable { error: String },
}

impl<T> CategoryOutcome<T> {
    pub fn unavailable(error: impl fmt::Display) -> Self {
        Self::Unavailable {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
impl<T> CategoryOutcome<T> {
    pub fn checked(&self) -> Option<&T> {
        match self {
            Self::Checked(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Checked(_) => None,
            Self::Unavailable { error } => Some(error),
        }
    }
}

impl<T> From<Result<T, ProbeError>> for CategoryOutcome<T> {
    fn from(value: Result<T, ProbeError>) -> Self {
        match value {
            Ok(v) => Self::Checked(v),
            Err(err) => Self::unavailable(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CpuResult {
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MemoryResult {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiskEntry {
    pub device: String,
    pub mountpoint: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
    pub over_threshold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    NotFound,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProcessResult {
    pub name: String,
    pub status: ProcessStatus,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct NetworkResult {
    pub ping_results: OrderedMap<String, bool>,
    pub port_results: OrderedMap<String, OrderedMap<u16, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
    NotFound,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

pub type ServiceResults = OrderedMap<String, ServiceStatus>;

/// Keeps insertion order, so report keys follow the order of the
/// configuration they were produced from.
pub type OrderedMap<K, V> = IndexMap<K, V>;
