//! Starts, replaces and stops the poll loops
//!
//! - at most one foreground poller exists; selecting another server shuts
//!   the previous one down
//! - the background monitor runs while at least one server is monitored

use std::time::Duration;

use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::error::MonitorResult;

use super::background::BackgroundHandle;
use super::foreground::ForegroundHandle;
use super::pipeline::Pipeline;

/// Loop timing shared by both actors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub foreground_agent: Duration,
    pub foreground_standard: Duration,
    pub background: Duration,
    pub rate_limit_backoff: Duration,
}

impl PollTiming {
    pub fn foreground(&self, using_agent: bool) -> Duration {
        if using_agent {
            self.foreground_agent
        } else {
            self.foreground_standard
        }
    }
}

impl From<&PollingConfig> for PollTiming {
    fn from(config: &PollingConfig) -> Self {
        Self {
            foreground_agent: config.foreground_interval(true),
            foreground_standard: config.foreground_interval(false),
            background: config.background_interval(),
            rate_limit_backoff: config.rate_limit_backoff(),
        }
    }
}

pub struct Scheduler {
    pipeline: Pipeline,
    timing: PollTiming,
    foreground: Option<ForegroundHandle>,
    background: Option<BackgroundHandle>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, timing: PollTiming) -> Self {
        Self {
            pipeline,
            timing,
            foreground: None,
            background: None,
        }
    }

    /// Start polling `server_id` in the foreground, replacing any previous poller
    pub async fn select(&mut self, server_id: &str) {
        self.deselect().await;
        info!("polling {server_id} in the foreground");
        self.foreground = Some(ForegroundHandle::spawn(
            server_id,
            self.pipeline.clone(),
            self.timing,
        ));
    }

    /// Stop the foreground poller, if any
    pub async fn deselect(&mut self) {
        if let Some(previous) = self.foreground.take() {
            debug!("stopping foreground poller for {}", previous.server_id());
            if let Err(e) = previous.shutdown().await {
                // The poller already exited on its own.
                debug!("{e:#}");
            }
        }
    }

    /// Restart the foreground poller so changed agent settings apply now
    pub async fn restart_foreground(&mut self) {
        if let Some(server_id) = self.selected().map(str::to_string) {
            self.select(&server_id).await;
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.foreground.as_ref().map(ForegroundHandle::server_id)
    }

    pub fn foreground(&self) -> Option<&ForegroundHandle> {
        self.foreground.as_ref()
    }

    pub fn background(&self) -> Option<&BackgroundHandle> {
        self.background
            .as_ref()
            .filter(|handle| !handle.is_stopped())
    }

    /// Start or stop the background monitor to match the monitored set
    ///
    /// Returns whether the monitor is running afterwards.
    pub async fn refresh_background(&mut self) -> MonitorResult<bool> {
        let monitored = !self.pipeline.store().monitored_ids().await?.is_empty();
        let running = match &self.background {
            Some(handle) => handle.is_alive().await,
            None => false,
        };

        match (monitored, running) {
            (true, false) => {
                info!("starting background monitor");
                self.background = Some(BackgroundHandle::spawn(
                    self.pipeline.clone(),
                    self.timing,
                ));
            }
            (false, true) => self.stop_background().await,
            _ => {}
        }

        Ok(monitored)
    }

    async fn stop_background(&mut self) {
        if let Some(background) = self.background.take()
            && let Err(e) = background.shutdown().await
        {
            debug!("background monitor already gone: {e:#}");
        }
    }

    /// Stop every loop
    pub async fn stop_all(&mut self) {
        self.deselect().await;
        self.stop_background().await;
    }
}
