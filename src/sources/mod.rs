//! Telemetry sources
//!
//! Two independent fetchers produce the same [`TelemetrySample`](crate::TelemetrySample):
//!
//! - **Control panel** ([`panel::PanelClient`]): authoritative for topology,
//!   allocated resources and the coarse state block (status, CPU, traffic).
//! - **Agent** ([`agent::AgentClient`]): optional sidecar on the server itself,
//!   reporting CPU, memory, disk and uptime. Short timeout, since an
//!   unreachable agent must not stall a poll cycle.
//!
//! Both classify failures into [`FetchError`].

pub mod agent;
pub mod error;
pub mod panel;

pub use agent::AgentClient;
pub use error::FetchError;
pub use panel::{Account, PanelClient, PowerAction};
