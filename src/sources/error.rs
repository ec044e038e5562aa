//! Error classification for telemetry sources

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a fetch from either source failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The control panel rejected the API key (HTTP 401)
    #[error("control panel rejected the API key")]
    Unauthorized,

    /// The control panel asked us to slow down (HTTP 429)
    #[error("control panel rate limit reached")]
    RateLimited,

    /// The agent could not be reached or gave an unusable answer
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    /// The agent did not answer in time
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Map a non-success HTTP status from the control panel
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => FetchError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
            status => FetchError::Other(format!("HTTP error: {status}")),
        }
    }

    /// Agent-side failures that should make callers fall back to the panel
    pub fn is_agent_failure(&self) -> bool {
        matches!(self, FetchError::Unreachable(_) | FetchError::Timeout(_))
    }
}
