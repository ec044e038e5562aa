//! Engine facade for the UI
//!
//! The UI only talks to [`Hub`]: it sends intents (select a server, save
//! settings, send a power action) and consumes [`HubEvent`]s from
//! [`Hub::subscribe`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use vps_watch::config::Config;
//! use vps_watch::hub::Hub;
//! use vps_watch::storage::MemoryStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let hub = Hub::connect(&Config::default(), "api-key", Arc::new(MemoryStore::new())).await?;
//! let mut events = hub.subscribe();
//! hub.select_server("42").await;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

use crate::ServerSnapshot;
use crate::actors::{CycleReport, HubEvent, Pipeline, PollOrigin, PollTiming, Scheduler};
use crate::alerts::{AlertEngine, BroadcastSink, FanoutSink, LogSink, WebhookSink};
use crate::config::{AgentEndpoint, AlertSettings, Config, ResourceSettings};
use crate::coordinator::HybridCoordinator;
use crate::error::{MonitorError, MonitorResult};
use crate::sources::{Account, PowerAction};
use crate::storage::{HistoryEvent, SettingsStore};

const EVENT_CAPACITY: usize = 256;

pub struct Hub {
    account: Account,
    pipeline: Pipeline,
    scheduler: Mutex<Scheduler>,
    /// Serializes read-modify-write of per-server settings
    settings_lock: Mutex<()>,
    events: broadcast::Sender<HubEvent>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Verify the API key and start background monitoring if anything is
    /// monitored
    #[instrument(skip_all)]
    pub async fn connect(
        config: &Config,
        token: &str,
        store: Arc<dyn SettingsStore>,
    ) -> MonitorResult<Self> {
        let coordinator = HybridCoordinator::from_config(config, token)?;
        Self::with_coordinator(config, coordinator, store).await
    }

    /// Like [`Hub::connect`] with a prepared coordinator
    pub async fn with_coordinator(
        config: &Config,
        coordinator: HybridCoordinator,
        store: Arc<dyn SettingsStore>,
    ) -> MonitorResult<Self> {
        Self::build(config, coordinator, store, PollTiming::from(&config.polling)).await
    }

    /// Fully custom construction, mostly for tests with short intervals
    pub async fn build(
        config: &Config,
        coordinator: HybridCoordinator,
        store: Arc<dyn SettingsStore>,
        timing: PollTiming,
    ) -> MonitorResult<Self> {
        let account = coordinator.panel().account().await?;
        info!("signed in as {} <{}>", account.name, account.email);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut sink = FanoutSink::new()
            .with(LogSink)
            .with(BroadcastSink::new(events.clone()));
        if let Some(webhook) = &config.alerts.webhook {
            debug!("delivering notifications to webhook as well");
            let webhook = WebhookSink::new(webhook.clone()).map_err(|e| {
                MonitorError::Configuration(format!("failed to build webhook client: {e}"))
            })?;
            sink = sink.with(webhook);
        }

        let pipeline = Pipeline::new(
            Arc::new(coordinator),
            store,
            AlertEngine::new(config.alerts.cpu_cooldown()),
            Arc::new(sink),
            events.clone(),
        );

        let mut scheduler = Scheduler::new(pipeline.clone(), timing);
        scheduler.refresh_background().await?;

        Ok(Self {
            account,
            pipeline,
            scheduler: Mutex::new(scheduler),
            settings_lock: Mutex::new(()),
            events,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// All servers of the account, without live state
    pub async fn list_servers(&self) -> MonitorResult<Vec<ServerSnapshot>> {
        let servers = self.pipeline.coordinator().panel().list_servers().await?;
        self.pipeline.coordinator().seed(&servers);
        Ok(servers)
    }

    /// Start foreground polling of `server_id`, replacing the previous one
    pub async fn select_server(&self, server_id: &str) {
        self.scheduler.lock().await.select(server_id).await;
    }

    pub async fn deselect_server(&self) {
        self.scheduler.lock().await.deselect().await;
    }

    pub async fn selected_server(&self) -> Option<String> {
        self.scheduler.lock().await.selected().map(str::to_string)
    }

    /// Whether the background monitor is currently running
    pub async fn is_monitoring(&self) -> bool {
        self.scheduler.lock().await.background().is_some()
    }

    /// Run one cycle for `server_id` outside of any loop
    pub async fn refresh(&self, server_id: &str) -> MonitorResult<CycleReport> {
        self.pipeline
            .run_cycle(server_id, PollOrigin::Foreground)
            .await
    }

    pub async fn settings(&self, server_id: &str) -> MonitorResult<ResourceSettings> {
        Ok(self.pipeline.store().settings(server_id).await?)
    }

    /// Save the alert part of a server's settings
    ///
    /// Starts or stops the background monitor when the monitored set changes.
    #[instrument(skip(self, alerts))]
    pub async fn update_alert_settings(
        &self,
        server_id: &str,
        alerts: AlertSettings,
    ) -> MonitorResult<()> {
        {
            let _guard = self.settings_lock.lock().await;
            let store = self.pipeline.store();
            let mut settings = store.settings(server_id).await?;
            settings.alerts = alerts;
            store.save_settings(server_id, &settings).await?;
        }

        self.scheduler.lock().await.refresh_background().await?;
        Ok(())
    }

    /// Save the agent endpoint of a server
    ///
    /// If the server is being viewed its poller restarts with the new
    /// endpoint.
    #[instrument(skip(self, agent))]
    pub async fn save_agent_settings(
        &self,
        server_id: &str,
        agent: AgentEndpoint,
    ) -> MonitorResult<()> {
        {
            let _guard = self.settings_lock.lock().await;
            let store = self.pipeline.store();
            let mut settings = store.settings(server_id).await?;
            settings.agent = agent;
            store.save_settings(server_id, &settings).await?;
        }

        let mut scheduler = self.scheduler.lock().await;
        if scheduler.selected() == Some(server_id) {
            scheduler.restart_foreground().await;
        }
        Ok(())
    }

    pub async fn history(&self, server_id: &str) -> MonitorResult<Vec<HistoryEvent>> {
        Ok(self.pipeline.store().history(server_id).await?)
    }

    pub async fn clear_history(&self, server_id: &str) -> MonitorResult<()> {
        Ok(self.pipeline.store().clear_history(server_id).await?)
    }

    /// Send `start`, `restart`, `stop` or `kill` to a server
    ///
    /// On success the viewed server is refreshed right away.
    #[instrument(skip(self))]
    pub async fn power_action(&self, server_id: &str, action: &str) -> MonitorResult<()> {
        let action: PowerAction = action.parse()?;
        self.pipeline
            .coordinator()
            .panel()
            .power(server_id, action)
            .await?;

        let scheduler = self.scheduler.lock().await;
        if let Some(foreground) = scheduler.foreground()
            && foreground.server_id() == server_id
        {
            match foreground.poll_now().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("refresh after {action} failed: {e}"),
                Err(e) => warn!("refresh after {action} failed: {e:#}"),
            }
        }
        Ok(())
    }

    /// Stop all polling and forget cached baselines and alert state
    pub async fn logout(&self) {
        info!("logging out");
        self.scheduler.lock().await.stop_all().await;
        self.pipeline.coordinator().forget_all();
        self.pipeline.cells().clear();
    }

    /// Logout and release the store
    pub async fn shutdown(&self) -> MonitorResult<()> {
        self.logout().await;
        self.pipeline.store().close().await.map_err(MonitorError::from)
    }
}
