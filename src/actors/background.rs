//! BackgroundMonitor - walks every monitored server once per cycle
//!
//! Runs independently of what the user is viewing. At the start of every
//! cycle it re-reads the monitored set and exits once it is empty.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{MonitorError, MonitorResult};

use super::messages::{HubEvent, MonitorCommand, PollOrigin};
use super::pipeline::Pipeline;
use super::scheduler::PollTiming;

/// Whether the monitor keeps going after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Continue,
    NothingMonitored,
}

pub struct BackgroundMonitor {
    pipeline: Pipeline,
    timing: PollTiming,
    command_rx: mpsc::Receiver<MonitorCommand>,
}

impl BackgroundMonitor {
    pub fn new(
        pipeline: Pipeline,
        timing: PollTiming,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        Self {
            pipeline,
            timing,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting background monitor");

        let mut next_cycle = Instant::now();

        loop {
            tokio::select! {
                _ = sleep_until(next_cycle) => {
                    match self.cycle().await {
                        Ok((_, CycleEnd::NothingMonitored)) => break,
                        Ok((_, CycleEnd::Continue)) => {}
                        Err(e) => error!("background cycle failed: {e}"),
                    }
                    next_cycle = Instant::now() + self.timing.background;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.cycle().await;
                            let stop = matches!(result, Ok((_, CycleEnd::NothingMonitored)));
                            let _ = respond_to.send(result.map(|(polled, _)| polled));
                            if stop {
                                break;
                            }
                        }

                        MonitorCommand::Ping { respond_to } => {
                            let _ = respond_to.send(());
                        }

                        MonitorCommand::Shutdown => {
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

        debug!("background monitor stopped");
    }

    /// Poll every monitored server once
    ///
    /// Per-server failures are logged and skipped. A rejected API key ends
    /// the cycle early since every further request would fail the same way.
    async fn cycle(&mut self) -> MonitorResult<(usize, CycleEnd)> {
        let monitored = self.pipeline.store().monitored_ids().await?;
        if monitored.is_empty() {
            info!("no monitored servers left, stopping background monitor");
            return Ok((0, CycleEnd::NothingMonitored));
        }

        let mut polled = 0;
        for server_id in &monitored {
            match self
                .pipeline
                .run_cycle(server_id, PollOrigin::Background)
                .await
            {
                Ok(_) => polled += 1,
                Err(MonitorError::Auth) => {
                    self.pipeline.publish(HubEvent::AuthFailed {
                        server_id: server_id.clone(),
                    });
                    return Err(MonitorError::Auth);
                }
                Err(MonitorError::RateLimited) => {
                    warn!("{server_id}: rate limited, pausing for {:?}", self.timing.rate_limit_backoff);
                    sleep(self.timing.rate_limit_backoff).await;
                }
                Err(e) => warn!("{server_id}: {e}"),
            }
        }

        debug!("background cycle polled {polled}/{} servers", monitored.len());
        Ok((polled, CycleEnd::Continue))
    }
}

/// Handle for controlling the BackgroundMonitor
#[derive(Clone)]
pub struct BackgroundHandle {
    sender: mpsc::Sender<MonitorCommand>,
}

impl BackgroundHandle {
    pub fn spawn(pipeline: Pipeline, timing: PollTiming) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = BackgroundMonitor::new(pipeline, timing, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a full cycle now; returns how many servers were polled
    pub async fn poll_now(&self) -> Result<MonitorResult<usize>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    /// Whether the monitor task has exited
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether the monitor is still going to run its next cycle
    ///
    /// A monitor that already decided to exit drops the ping unanswered,
    /// even if its task has not finished yet. Waits for an in-flight cycle.
    pub async fn is_alive(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(MonitorCommand::Ping { respond_to: tx })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.is_ok()
    }
}
