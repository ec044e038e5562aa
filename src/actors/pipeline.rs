//! One poll cycle for one server
//!
//! ```text
//! settings snapshot → coordinator (agent | panel, fallback) → [cell lock]
//!     last status → alert engine on a copy of the state → history + last
//!     status written → state committed
//! [unlock] → notifications → SampleEvent
//! ```
//!
//! The foreground poller and the background monitor both drive this same
//! pipeline and share its state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace, warn};

use crate::ServerSnapshot;
use crate::alerts::{AlertEngine, Notification, NotificationSink, Verdict};
use crate::coordinator::{FetchOutcome, HybridCoordinator, Source};
use crate::error::MonitorResult;
use crate::storage::SettingsStore;

use super::cells::ResourceCells;
use super::messages::{HubEvent, PollOrigin, SampleEvent};

/// Result of a successful cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: ServerSnapshot,
    pub source: Source,
    /// The agent was configured but the sample came from the panel
    pub fell_back: bool,
    pub verdict: Verdict,
}

impl CycleReport {
    pub fn using_agent(&self) -> bool {
        self.source == Source::Agent
    }
}

/// Shared collaborators of both poll loops
#[derive(Clone)]
pub struct Pipeline {
    coordinator: Arc<HybridCoordinator>,
    store: Arc<dyn SettingsStore>,
    engine: AlertEngine,
    cells: Arc<ResourceCells>,
    sink: Arc<dyn NotificationSink>,
    events: broadcast::Sender<HubEvent>,
}

impl Pipeline {
    pub fn new(
        coordinator: Arc<HybridCoordinator>,
        store: Arc<dyn SettingsStore>,
        engine: AlertEngine,
        sink: Arc<dyn NotificationSink>,
        events: broadcast::Sender<HubEvent>,
    ) -> Self {
        Self {
            coordinator,
            store,
            engine,
            cells: Arc::new(ResourceCells::new()),
            sink,
            events,
        }
    }

    pub fn coordinator(&self) -> &HybridCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn cells(&self) -> &ResourceCells {
        &self.cells
    }

    pub fn publish(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            trace!("no receivers for hub event");
        }
    }

    /// Fetch, evaluate and record one sample for `server_id`
    ///
    /// Errors leave the alert state untouched, except for the agent
    /// fallback which is recorded as soon as the agent fails. Notifications
    /// are delivered after the server's cell is released.
    #[instrument(skip(self), fields(origin = ?origin))]
    pub async fn run_cycle(&self, server_id: &str, origin: PollOrigin) -> MonitorResult<CycleReport> {
        let settings = self.store.settings(server_id).await?;

        let (snapshot, source, fell_back) =
            match self.coordinator.fetch(server_id, &settings).await? {
                FetchOutcome::Fetched { snapshot, source } => (snapshot, source, false),
                FetchOutcome::SourceFallback { reason } => {
                    warn!("{server_id}: {reason}, retrying through the control panel");
                    self.record_source(server_id, false).await;
                    let snapshot = self.coordinator.fetch_standard(server_id).await?;
                    (snapshot, Source::Standard, true)
                }
            };

        if source == Source::Agent {
            self.record_source(server_id, true).await;
        }

        let verdict = {
            let cell = self.cells.cell(server_id);
            let mut state = cell.lock().await;

            let mut next = state.clone();
            next.last_status = self
                .store
                .last_status(server_id)
                .await?
                .or(state.last_status);

            let verdict = self.engine.evaluate(
                server_id,
                &snapshot.info.name,
                &settings.alerts,
                &mut next,
                &snapshot.sample,
                Utc::now(),
            );

            for event in &verdict.history {
                self.store.append_history(server_id, event.clone()).await?;
            }
            self.store
                .set_last_status(server_id, snapshot.sample.status)
                .await?;

            *state = next;
            verdict
        };

        for event in &verdict.history {
            self.publish(HubEvent::HistoryAppended {
                server_id: server_id.to_string(),
                event: event.clone(),
            });
        }
        for notification in &verdict.notifications {
            self.sink.notify(notification).await;
        }

        debug!(
            "{server_id}: {} via {source:?}, {} notification(s)",
            snapshot.sample.status,
            verdict.notifications.len()
        );

        self.publish(HubEvent::Sample(SampleEvent {
            server_id: server_id.to_string(),
            snapshot: snapshot.clone(),
            source,
            origin,
            timestamp: Utc::now(),
        }));

        Ok(CycleReport {
            snapshot,
            source,
            fell_back,
            verdict,
        })
    }

    async fn record_source(&self, server_id: &str, using_agent: bool) {
        let notification: Option<Notification> = {
            let cell = self.cells.cell(server_id);
            let mut state = cell.lock().await;
            self.engine
                .source_transition(server_id, &mut state, using_agent)
        };

        if let Some(notification) = notification {
            self.sink.notify(&notification).await;
        }
    }
}
