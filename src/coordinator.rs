//! Hybrid fetch coordinator
//!
//! Decides per server whether to ask the control panel or the agent, and
//! merges agent readings onto a cached panel baseline.
//!
//! ```text
//! agent disabled:  panel ──────────────────────────────► sample (Standard)
//! agent enabled:   agent ──ok──► baseline (cache|panel) ─► merged (Agent)
//!                    └──unreachable/timeout──────────────► SourceFallback
//! ```
//!
//! The caller reacts to [`FetchOutcome::SourceFallback`] by calling
//! [`HybridCoordinator::fetch_standard`] within the same cycle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use crate::config::{Config, ResourceSettings};
use crate::sources::{AgentClient, FetchError, PanelClient};
use crate::{ServerSnapshot, TelemetrySample};

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Agent,
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        snapshot: ServerSnapshot,
        source: Source,
    },
    /// The agent failed; retry through the panel
    SourceFallback { reason: FetchError },
}

#[derive(Debug, Clone)]
struct Baseline {
    fetched_at: Instant,
    snapshot: ServerSnapshot,
}

impl Baseline {
    fn usable(&self, ttl: Duration) -> bool {
        self.snapshot.has_state && self.fetched_at.elapsed() < ttl
    }
}

pub struct HybridCoordinator {
    panel: PanelClient,
    agent: AgentClient,
    baselines: Mutex<HashMap<String, Baseline>>,
    baseline_ttl: Duration,
}

impl HybridCoordinator {
    pub fn new(panel: PanelClient, agent: AgentClient, baseline_ttl: Duration) -> Self {
        Self {
            panel,
            agent,
            baselines: Mutex::new(HashMap::new()),
            baseline_ttl,
        }
    }

    /// Build both clients from the configuration file
    pub fn from_config(config: &Config, token: &str) -> Result<Self, FetchError> {
        Ok(Self::new(
            PanelClient::new(&config.api, token)?,
            AgentClient::new(config.polling.agent_timeout())?,
            config.polling.baseline_ttl(),
        ))
    }

    pub fn panel(&self) -> &PanelClient {
        &self.panel
    }

    /// Fetch one sample for `server_id` using the source its settings select
    #[instrument(skip(self, settings), fields(agent = settings.agent_enabled()))]
    pub async fn fetch(
        &self,
        server_id: &str,
        settings: &ResourceSettings,
    ) -> Result<FetchOutcome, FetchError> {
        if !settings.agent_enabled() {
            let snapshot = self.fetch_standard(server_id).await?;
            return Ok(FetchOutcome::Fetched {
                snapshot,
                source: Source::Standard,
            });
        }

        let agent_sample = match self.agent.fetch(&settings.agent).await {
            Ok(sample) => sample,
            Err(reason) if reason.is_agent_failure() => {
                debug!("agent failed: {reason}");
                return Ok(FetchOutcome::SourceFallback { reason });
            }
            Err(e) => return Err(e),
        };

        let baseline = self.baseline(server_id).await?;
        Ok(FetchOutcome::Fetched {
            snapshot: merge(baseline, agent_sample),
            source: Source::Agent,
        })
    }

    /// Fetch server details with state from the panel and refresh the cache
    #[instrument(skip(self))]
    pub async fn fetch_standard(&self, server_id: &str) -> Result<ServerSnapshot, FetchError> {
        let snapshot = self.panel.server(server_id).await?;
        self.remember(server_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn baseline(&self, server_id: &str) -> Result<ServerSnapshot, FetchError> {
        let cached = self
            .lock()
            .get(server_id)
            .filter(|baseline| baseline.usable(self.baseline_ttl))
            .map(|baseline| baseline.snapshot.clone());

        match cached {
            Some(snapshot) => {
                trace!("using cached baseline for {server_id}");
                Ok(snapshot)
            }
            None => self.fetch_standard(server_id).await,
        }
    }

    /// Seed the cache from a server listing
    ///
    /// Listing entries carry no state block, so they never serve as a merge
    /// baseline on their own. Existing entries only get their topology
    /// refreshed.
    pub fn seed(&self, servers: &[ServerSnapshot]) {
        let mut baselines = self.lock();
        for server in servers {
            match baselines.get_mut(&server.info.id) {
                Some(baseline) => baseline.snapshot.info = server.info.clone(),
                None => {
                    baselines.insert(
                        server.info.id.clone(),
                        Baseline {
                            fetched_at: Instant::now(),
                            snapshot: server.clone(),
                        },
                    );
                }
            }
        }
    }

    pub fn forget_all(&self) {
        self.lock().clear();
    }

    fn remember(&self, server_id: &str, snapshot: ServerSnapshot) {
        self.lock().insert(
            server_id.to_string(),
            Baseline {
                fetched_at: Instant::now(),
                snapshot,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Baseline>> {
        // The map holds plain data, a poisoned guard is still consistent.
        self.baselines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lay agent readings over a panel baseline
///
/// The agent wins for CPU, memory, disk, uptime and the running flag. The
/// panel keeps the status and everything the agent never reports (traffic,
/// addresses, allocations).
pub fn merge(mut baseline: ServerSnapshot, agent: TelemetrySample) -> ServerSnapshot {
    let sample = &mut baseline.sample;
    sample.running = agent.running;
    sample.cpu = agent.cpu.or(sample.cpu);
    sample.memory = agent.memory.or(sample.memory);
    sample.disk = agent.disk.or(sample.disk);
    sample.uptime = agent.uptime.or(sample.uptime);
    sample.network = sample.network.or(agent.network);

    if let Some(memory) = agent.memory {
        baseline.info.memory = Some(memory.total);
    }
    baseline.has_state = true;
    baseline
}
