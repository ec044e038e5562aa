//! Engine level error taxonomy

use std::time::Duration;

use thiserror::Error;

use crate::sources::{FetchError, panel::UnknownPowerAction};
use crate::storage::StorageError;

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors surfaced by the monitoring engine
///
/// Only [`MonitorError::Auth`] is fatal: it has to end the session one layer
/// above the engine. Everything else is recoverable by retrying later.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("authentication failed, the API key is invalid or expired")]
    Auth,

    #[error("rate limited by the control panel")]
    RateLimited,

    #[error("agent unreachable, falling back to the control panel: {0}")]
    SourceUnreachable(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MonitorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::Auth)
    }
}

impl From<FetchError> for MonitorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Unauthorized => MonitorError::Auth,
            FetchError::RateLimited => MonitorError::RateLimited,
            FetchError::Unreachable(reason) => MonitorError::SourceUnreachable(reason),
            FetchError::Timeout(after) => {
                MonitorError::SourceUnreachable(format!("no answer within {}", human(after)))
            }
            FetchError::Other(reason) => MonitorError::Transient(reason),
        }
    }
}

impl From<UnknownPowerAction> for MonitorError {
    fn from(err: UnknownPowerAction) -> Self {
        MonitorError::Configuration(err.to_string())
    }
}

fn human(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f32())
}
