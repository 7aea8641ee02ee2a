use crate::collectors::{
    ensure_supported, HostMetrics, MemoryCounters, Partition, PartitionUsage, ProbeError,
};
use crate::report::{CpuResult, DiskEntry, MemoryResult};
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

/// `HostMetrics` backed by `sysinfo`. Every call builds its own `System`, so
/// concurrent categories never share refresh state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoHost;

impl HostMetrics for SysinfoHost {
    fn cpu_percent(&self, window: Duration) -> Result<f64, ProbeError> {
        ensure_supported("cpu")?;
        let mut system = System::new();
        system.refresh_cpu();
        std::thread::sleep(window.max(System::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu();
        Ok(system.global_cpu_info().cpu_usage() as f64)
    }

    fn memory(&self) -> Result<MemoryCounters, ProbeError> {
        ensure_supported("memory")?;
        let mut system = System::new();
        system.refresh_memory();
        Ok(MemoryCounters {
            total: system.total_memory(),
            available: system.available_memory(),
            used: system.used_memory(),
            free: system.free_memory(),
        })
    }

    fn partitions(&self) -> Result<Vec<Partition>, ProbeError> {
        ensure_supported("disk")?;
        let mut system = System::new();
        system.refresh_disks_list();
        Ok(system
            .disks()
            .iter()
            .map(|d| Partition {
                device: d.name().to_string_lossy().to_string(),
                mountpoint: d.mount_point().to_string_lossy().to_string(),
            })
            .collect())
    }

    #[cfg(unix)]
    fn partition_usage(&self, partition: &Partition) -> Result<PartitionUsage, ProbeError> {
        let stat = nix::sys::statvfs::statvfs(partition.mountpoint.as_str()).map_err(|errno| {
            ProbeError::Access {
                target: partition.mountpoint.clone(),
                source: errno.into(),
            }
        })?;
        Ok(usage_from_blocks(
            stat.blocks() as u64,
            stat.blocks_free() as u64,
            stat.blocks_available() as u64,
            stat.fragment_size() as u64,
        ))
    }

    #[cfg(not(unix))]
    fn partition_usage(&self, partition: &Partition) -> Result<PartitionUsage, ProbeError> {
        let mut system = System::new();
        system.refresh_disks_list();
        let disk = system
            .disks()
            .iter()
            .find(|d| d.mount_point().to_string_lossy() == partition.mountpoint.as_str())
            .ok_or_else(|| ProbeError::Access {
                target: partition.mountpoint.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
        let total = disk.total_space();
        let free = disk.available_space();
        let used = total.saturating_sub(free);
        Ok(PartitionUsage {
            total,
            used,
            free,
            percent: usage_percent(used, free),
        })
    }
}

/// Usage as `df` reports it: blocks reserved for root count neither as used
/// nor as free.
#[cfg_attr(not(unix), allow(dead_code))]
fn usage_from_blocks(blocks: u64, blocks_free: u64, blocks_available: u64, fragment_size: u64) -> PartitionUsage {
    let total = blocks.saturating_mul(fragment_size);
    let free = blocks_available.saturating_mul(fragment_size);
    let used = total.saturating_sub(blocks_free.saturating_mul(fragment_size));
    PartitionUsage {
        total,
        used,
        free,
        percent: usage_percent(used, free),
    }
}

fn usage_percent(used: u64, free: u64) -> f64 {
    let visible = used.saturating_add(free);
    if visible == 0 {
        return 0.0;
    }
    (used as f64 / visible as f64) * 100.0
}

pub fn is_over_threshold(percent: f64, threshold_percent: u8) -> bool {
    percent > f64::from(threshold_percent)
}

pub fn sample_cpu(host: &dyn HostMetrics, window: Duration) -> Result<CpuResult, ProbeError> {
    let percent = host.cpu_percent(window)?;
    Ok(CpuResult { percent })
}

pub fn sample_memory(host: &dyn HostMetrics) -> Result<MemoryResult, ProbeError> {
    let counters = host.memory()?;
    let percent = if counters.total > 0 {
        (counters.total.saturating_sub(counters.available) as f64 / counters.total as f64) * 100.0
    } else {
        0.0
    };
    Ok(MemoryResult {
        total: counters.total,
        available: counters.available,
        used: counters.used,
        free: counters.free,
        percent,
    })
}

/// One entry per readable partition, in enumeration order. Partitions whose
/// usage cannot be read are left out.
pub fn check_disks(host: &dyn HostMetrics, threshold_percent: u8) -> Result<Vec<DiskEntry>, ProbeError> {
    let partitions = host.partitions()?;
    let mut out = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let usage = match host.partition_usage(&partition) {
            Ok(usage) => usage,
            Err(err) => {
                debug!(mountpoint = %partition.mountpoint, error = %err, "partition skipped");
                continue;
            }
        };
        out.push(DiskEntry {
            device: partition.device,
            mountpoint: partition.mountpoint,
            total: usage.total,
            used: usage.used,
            free: usage.free,
            percent: usage.percent,
            over_threshold: is_over_threshold(usage.percent, threshold_percent),
        });
    }
    Ok(out)
}
