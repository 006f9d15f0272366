//! Metric sources for sysdash. Every query is independent and may fail on its own;
//! callers skip the failed family for that tick.

use crate::types::{MemoryUsage, StorageUsage, SysInfo};
use std::time::{Duration, Instant};
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System,
    MINIMUM_CPU_UPDATE_INTERVAL,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("{0} is unavailable on this host")]
    Unavailable(&'static str),
    /// One filesystem failed while the rest enumerated fine. `SysinfoSource`
    /// never reports this; sources that stat mounts one by one do.
    #[error("mount {mount}: {reason}")]
    Mount { mount: String, reason: String },
}

/// Raw usage of one mounted filesystem, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountStat {
    pub mount: String,
    pub used: u64,
    pub total: u64,
}

/// Queries the host for one metric family at a time. Implementations hold
/// whatever handles they need; nothing here is shared between connections.
pub trait MetricSource: Send {
    /// Best effort; unknown parts are filled with placeholders.
    fn host_info(&mut self) -> SysInfo;
    /// Boot time as seconds since the Unix epoch.
    fn boot_time(&mut self) -> Result<u64, SampleError>;
    fn cpu_percent(&mut self) -> Result<f32, SampleError>;
    /// Time still needed before `cpu_percent` measures a real interval.
    fn cpu_settle(&self) -> Duration {
        Duration::ZERO
    }
    fn memory(&mut self) -> Result<MemoryUsage, SampleError>;
    /// One entry per mounted filesystem; a failed mount is its own `Err`.
    fn mounts(&mut self) -> Vec<Result<MountStat, SampleError>>;
    /// Cumulative (received, sent) bytes summed over all interfaces.
    fn net_counters(&mut self) -> Result<(u64, u64), SampleError>;
}

/// `used` as a percentage of `total`. Callers guarantee `total > 0`.
fn percent(used: u64, total: u64) -> f64 {
    used as f64 * 100.0 / total as f64
}

/// Drops mounts that failed or report no capacity (pseudo filesystems).
pub fn storage_usage<I>(mounts: I) -> Vec<StorageUsage>
where
    I: IntoIterator<Item = Result<MountStat, SampleError>>,
{
    mounts
        .into_iter()
        .filter_map(|m| match m {
            Ok(m) if m.total > 0 => Some(StorageUsage {
                percent: percent(m.used, m.total),
                mount: m.mount,
                used: m.used,
                total: m.total,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("skipping mount: {e}");
                None
            }
        })
        .collect()
}

/// "ubuntu 22.04 x86_64", "arch x86_64" or just the architecture.
pub fn platform_string(distro: &str, version: Option<&str>, arch: &str) -> String {
    match (distro.trim(), version.map(str::trim)) {
        ("", _) => arch.to_string(),
        (d, Some(v)) if !v.is_empty() => format!("{d} {v} {arch}"),
        (d, _) => format!("{d} {arch}"),
    }
}

/// Production source backed by sysinfo handles, one set per connection.
pub struct SysinfoSource {
    sys: System,
    cpu_primed: Instant,
    disks: Disks,
    nets: Networks,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let disks = Disks::new_with_refreshed_list();
        let nets = Networks::new_with_refreshed_list();
        // Building with cpu usage takes the baseline reading; the next one is a
        // real delta only after MINIMUM_CPU_UPDATE_INTERVAL (see `cpu_settle`).
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let sys = System::new_with_specifics(refresh_kind);
        Self {
            sys,
            cpu_primed: Instant::now(),
            disks,
            nets,
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn host_info(&mut self) -> SysInfo {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let cpu_model = self
            .sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let platform = platform_string(
            &System::distribution_id(),
            System::os_version().as_deref(),
            std::env::consts::ARCH,
        );
        SysInfo {
            hostname,
            platform,
            cpu_model,
        }
    }

    fn boot_time(&mut self) -> Result<u64, SampleError> {
        match System::boot_time() {
            0 => Err(SampleError::Unavailable("boot time")),
            t => Ok(t),
        }
    }

    fn cpu_percent(&mut self) -> Result<f32, SampleError> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(SampleError::Unavailable("cpu usage"));
        }
        Ok(self.sys.global_cpu_usage())
    }

    fn cpu_settle(&self) -> Duration {
        MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(self.cpu_primed.elapsed())
    }

    fn memory(&mut self) -> Result<MemoryUsage, SampleError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable("memory"));
        }
        let used = total.saturating_sub(self.sys.available_memory());
        Ok(MemoryUsage {
            mem: percent(used, total),
            used,
            total,
        })
    }

    fn mounts(&mut self) -> Vec<Result<MountStat, SampleError>> {
        self.disks.refresh(true);
        self.disks
            .list()
            .iter()
            .map(|d| {
                let total = d.total_space();
                Ok(MountStat {
                    mount: d.mount_point().to_string_lossy().into_owned(),
                    used: total.saturating_sub(d.available_space()),
                    total,
                })
            })
            .collect()
    }

    fn net_counters(&mut self) -> Result<(u64, u64), SampleError> {
        self.nets.refresh(true);
        Ok(self.nets.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
            (
                rx.saturating_add(data.total_received()),
                tx.saturating_add(data.total_transmitted()),
            )
        }))
    }
}
