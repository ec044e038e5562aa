//! Per-server event history and its retention policy
//!
//! Lists are kept newest-first, hold at most [`MAX_EVENTS`] entries and
//! never contain anything older than [`MAX_AGE_DAYS`]. Stores apply
//! [`retain`] on every append and [`visible`] on every read, so entries age
//! out even when nothing new is written.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_EVENTS: usize = 50;

pub const MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "success" => Ok(Severity::Success),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

impl HistoryEvent {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp,
            message: message.into(),
            severity,
        }
    }
}

/// Oldest timestamp (exclusive) still kept at `now`
pub fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(MAX_AGE_DAYS)
}

/// Drop expired entries and truncate to the newest [`MAX_EVENTS`].
pub fn retain(events: &mut Vec<HistoryEvent>, now: DateTime<Utc>) {
    let cutoff = cutoff(now);
    events.retain(|event| event.timestamp > cutoff);
    events.truncate(MAX_EVENTS);
}

/// Read-side view of a stored list
pub fn visible(events: &[HistoryEvent], now: DateTime<Utc>) -> Vec<HistoryEvent> {
    let cutoff = cutoff(now);
    events
        .iter()
        .filter(|event| event.timestamp > cutoff)
        .take(MAX_EVENTS)
        .cloned()
        .collect()
}
