//! ForegroundPoller - polls the server the user is looking at
//!
//! One poller exists per viewed server. The scheduler replaces it whenever
//! the viewed server changes.
//!
//! ## Message Flow
//!
//! ```text
//! Deadline → Pipeline::run_cycle → SampleEvent / notifications / history
//!     ↑          │
//!     │          └─ interval: agent 15s, panel 30s, rate limited: backoff + interval
//!     └─── Commands (PollNow, Shutdown)
//! ```

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, instrument, warn};

use crate::error::{MonitorError, MonitorResult};

use super::messages::{HubEvent, PollOrigin, PollerCommand};
use super::pipeline::Pipeline;
use super::scheduler::PollTiming;

pub struct ForegroundPoller {
    server_id: String,
    pipeline: Pipeline,
    timing: PollTiming,
    command_rx: mpsc::Receiver<PollerCommand>,
    /// Whether the last cycle was served by the agent
    using_agent: bool,
}

impl ForegroundPoller {
    pub fn new(
        server_id: String,
        pipeline: Pipeline,
        timing: PollTiming,
        command_rx: mpsc::Receiver<PollerCommand>,
    ) -> Self {
        Self {
            server_id,
            pipeline,
            timing,
            command_rx,
            using_agent: false,
        }
    }

    /// Run until a Shutdown command arrives or the handle is dropped
    ///
    /// The first cycle runs immediately.
    #[instrument(skip(self), fields(server = %self.server_id))]
    pub async fn run(mut self) {
        debug!("starting foreground poller");

        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                _ = sleep_until(next_poll) => {
                    next_poll = Instant::now() + self.poll().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.cycle().await;
                            let _ = respond_to.send(result);
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("foreground poller stopped");
    }

    /// One timed cycle, returns the delay until the next one
    async fn poll(&mut self) -> std::time::Duration {
        match self.cycle().await {
            Ok(()) => self.timing.foreground(self.using_agent),
            Err(MonitorError::RateLimited) => {
                let delay = self.timing.rate_limit_backoff + self.timing.foreground(self.using_agent);
                warn!("rate limited, next poll in {delay:?}");
                delay
            }
            Err(e) => {
                error!("poll cycle failed: {e}");
                self.timing.foreground(self.using_agent)
            }
        }
    }

    async fn cycle(&mut self) -> MonitorResult<()> {
        match self
            .pipeline
            .run_cycle(&self.server_id, PollOrigin::Foreground)
            .await
        {
            Ok(report) => {
                self.using_agent = report.using_agent();
                Ok(())
            }
            Err(MonitorError::Auth) => {
                self.pipeline.publish(HubEvent::AuthFailed {
                    server_id: self.server_id.clone(),
                });
                Err(MonitorError::Auth)
            }
            Err(e) => Err(e),
        }
    }
}

/// Handle for controlling a ForegroundPoller
#[derive(Clone)]
pub struct ForegroundHandle {
    sender: mpsc::Sender<PollerCommand>,
    pub server_id: String,
}

impl ForegroundHandle {
    /// Spawn a poller for `server_id` as a tokio task
    pub fn spawn(server_id: impl Into<String>, pipeline: Pipeline, timing: PollTiming) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let server_id = server_id.into();

        let actor = ForegroundPoller::new(server_id.clone(), pipeline, timing, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            server_id,
        }
    }

    /// Trigger an immediate cycle and wait for its result
    pub async fn poll_now(&self) -> Result<MonitorResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Ask the poller to stop after its in-flight cycle
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    /// Whether the poller task has exited
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }
}
