pub mod actors;
pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod monitors;
pub mod sources;
pub mod storage;
pub mod util;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::{format_bytes, format_uptime};

/// Coarse power state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Offline,
    Suspended,
    Unknown,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Running => "running",
            ServerStatus::Offline => "offline",
            ServerStatus::Suspended => "suspended",
            ServerStatus::Unknown => "unknown",
        }
    }
}

impl FromStr for ServerStatus {
    type Err = std::convert::Infallible;

    /// Anything the panel reports that we do not model is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "running" => ServerStatus::Running,
            "offline" | "stopped" => ServerStatus::Offline,
            "suspended" => ServerStatus::Suspended,
            _ => ServerStatus::Unknown,
        })
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Used/total pair for memory or disk, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub used: u64,
    pub total: u64,
}

impl Usage {
    pub fn new(used: u64, total: u64) -> Self {
        Self { used, total }
    }

    /// Fraction used in `0.0..=1.0`, `None` when the total is zero.
    pub fn fraction(&self) -> Option<f32> {
        (self.total > 0).then(|| (self.used as f64 / self.total as f64) as f32)
    }

    /// Human readable `"used / total"` with binary prefixes.
    pub fn display(&self) -> String {
        format!("{} / {}", format_bytes(self.used), format_bytes(self.total))
    }
}

/// Cumulative traffic counters of the primary interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub rx: u64,
    pub tx: u64,
}

/// Normalized telemetry snapshot, independent of the source it came from.
///
/// Every fine-grained field is optional: the control panel usually only
/// reports CPU and traffic, the agent never reports traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub status: ServerStatus,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkCounters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

impl TelemetrySample {
    /// Sample with only a status, everything else absent
    pub fn with_status(status: ServerStatus) -> Self {
        Self {
            status,
            running: status == ServerStatus::Running,
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            uptime: None,
        }
    }

    pub fn cpu_display(&self) -> Option<String> {
        self.cpu.map(|cpu| format!("{cpu:.2} %"))
    }

    pub fn uptime_display(&self) -> Option<String> {
        self.uptime.map(format_uptime)
    }
}

/// Static description of a server as reported by the control panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
    pub hostname: Option<String>,
    /// Allocated memory in bytes
    pub memory: Option<u64>,
    /// Allocated CPU cores
    pub cores: Option<u32>,
    /// Capacity of the primary enabled disk in bytes
    pub disk: Option<u64>,
    pub suspended: bool,
    pub ipv4: Vec<String>,
}

/// Server topology together with its latest sample.
///
/// `has_state` is false for entries that came from the server listing,
/// which carries no state block; such entries cannot serve as a merge
/// baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub info: ServerInfo,
    pub has_state: bool,
    pub sample: TelemetrySample,
}
