//! Data types streamed to the dashboard.
//! Keep this module minimal and stable: it defines the wire format.

use serde::{Deserialize, Serialize};

/// A configured service to probe. The name doubles as the correlation key
/// for `service` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysInfo {
    pub hostname: String,
    pub platform: String,
    pub cpu_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Uptime {
    // "1d 2h 3m"
    pub uptime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub mount: String,
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuLoad {
    pub cpu: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub mem: f64,
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkThroughput {
    // cumulative totals summed over every interface
    pub rx: u64,
    pub tx: u64,
    // bytes since the previous network tick
    #[serde(rename = "rateRx")]
    pub rate_rx: u64,
    #[serde(rename = "rateTx")]
    pub rate_tx: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub status: Status,
}

/// One event on the stream. The serde tag is the `type` field the browser
/// switches on, so each variant owns exactly one tag and one payload shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MetricSample {
    #[serde(rename = "sysinfo")]
    SystemInfo { data: SysInfo },
    #[serde(rename = "services")]
    ServiceList { data: Vec<ServiceEntry> },
    #[serde(rename = "uptime")]
    Uptime { data: Uptime },
    #[serde(rename = "storage")]
    StorageUsage { data: Vec<StorageUsage> },
    #[serde(rename = "cpu")]
    CpuLoad { data: CpuLoad },
    #[serde(rename = "mem")]
    MemoryUsage { data: MemoryUsage },
    #[serde(rename = "network")]
    NetworkThroughput { data: NetworkThroughput },
    #[serde(rename = "service")]
    ServiceStatus { name: String, data: ServiceStatus },
}

impl MetricSample {
    pub fn event_type(&self) -> &'static str {
        match self {
            MetricSample::SystemInfo { .. } => "sysinfo",
            MetricSample::ServiceList { .. } => "services",
            MetricSample::Uptime { .. } => "uptime",
            MetricSample::StorageUsage { .. } => "storage",
            MetricSample::CpuLoad { .. } => "cpu",
            MetricSample::MemoryUsage { .. } => "mem",
            MetricSample::NetworkThroughput { .. } => "network",
            MetricSample::ServiceStatus { .. } => "service",
        }
    }
}
