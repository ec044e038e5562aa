//! Client for the optional per-server agent sidecar

use std::time::Duration;

use serde::Deserialize;
use tracing::{instrument, trace};

use crate::config::AgentEndpoint;
use crate::{ServerStatus, TelemetrySample, Usage};

use super::error::FetchError;

#[derive(Debug, Deserialize)]
struct AgentStats {
    status: String,
    uptime_seconds: u64,
    cpu: AgentCpu,
    memory: AgentMemory,
    disk: AgentDisk,
}

#[derive(Debug, Deserialize)]
struct AgentCpu {
    usage_percent: f32,
}

#[derive(Debug, Deserialize)]
struct AgentMemory {
    total_bytes: u64,
    used_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct AgentDisk {
    total_bytes: u64,
    used_bytes: u64,
}

impl AgentStats {
    fn into_sample(self) -> TelemetrySample {
        let online = self.status.eq_ignore_ascii_case("online");
        let status = if online {
            ServerStatus::Running
        } else {
            self.status.parse().unwrap_or(ServerStatus::Unknown)
        };

        TelemetrySample {
            status,
            running: online,
            cpu: Some(self.cpu.usage_percent),
            memory: Some(Usage::new(self.memory.used_bytes, self.memory.total_bytes)),
            disk: Some(Usage::new(self.disk.used_bytes, self.disk.total_bytes)),
            network: None,
            uptime: Some(self.uptime_seconds),
        }
    }
}

/// Fetches `/stats` from agents
///
/// Every failure is reported as [`FetchError::Unreachable`] or
/// [`FetchError::Timeout`], so callers can always fall back to the panel.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    #[instrument(skip(self, endpoint), fields(host = %endpoint.host, port = endpoint.port))]
    pub async fn fetch(&self, endpoint: &AgentEndpoint) -> Result<TelemetrySample, FetchError> {
        if endpoint.host.trim().is_empty() {
            return Err(FetchError::Unreachable("no agent host configured".to_string()));
        }

        let url = endpoint.stats_url();
        trace!("requesting agent stats from {url}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, endpoint.token.as_str())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(FetchError::Unreachable(format!(
                "agent answered with {}",
                response.status()
            )));
        }

        let stats: AgentStats = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Unreachable(format!("invalid stats payload: {e}"))
            }
        })?;

        Ok(stats.into_sample())
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Unreachable(error.to_string())
        }
    }
}
