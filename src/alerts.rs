//! Alert engine and notification delivery
//!
//! [`AlertEngine::evaluate`] decides, for one fresh sample, which
//! notifications to emit and which history events to record. It is a plain
//! function over the per-server [`AlertState`]; callers serialize access to
//! that state (see [`crate::actors::cells`]).
//!
//! Delivery goes through [`NotificationSink`] implementations. Delivery is
//! best effort, a failing sink never fails a poll cycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace};

use crate::actors::messages::HubEvent;
use crate::config::{AlertSettings, Webhook};
use crate::monitors::{CpuEvaluation, StatusTransition};
use crate::storage::{HistoryEvent, Severity};
use crate::{ServerStatus, TelemetrySample};

/// User visible alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub server_id: String,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(
        server_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Per-server alert bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    pub last_status: Option<ServerStatus>,
    pub last_cpu_alert: Option<DateTime<Utc>>,
    /// Whether the last successful fetch went through the agent
    pub using_agent: bool,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            last_status: None,
            last_cpu_alert: None,
            using_agent: true,
        }
    }
}

/// What a single evaluation decided
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub notifications: Vec<Notification>,
    pub history: Vec<HistoryEvent>,
}

impl Verdict {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.history.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    cpu_cooldown: Duration,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

impl AlertEngine {
    pub fn new(cpu_cooldown: Duration) -> Self {
        Self { cpu_cooldown }
    }

    /// Evaluate one sample against the alert rules
    ///
    /// The CPU rule runs before the status rule and both may fire in the
    /// same cycle. `state.last_status` is always replaced with the sample's
    /// status afterwards.
    #[instrument(skip_all, fields(server = %server_id))]
    pub fn evaluate(
        &self,
        server_id: &str,
        name: &str,
        settings: &AlertSettings,
        state: &mut AlertState,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
    ) -> Verdict {
        let mut verdict = Verdict::default();

        if settings.cpu_enabled
            && let Some(cpu) = sample.cpu
        {
            let evaluation = CpuEvaluation::evaluate(
                cpu,
                settings.cpu_threshold as f32,
                state.last_cpu_alert,
                now,
                self.cpu_cooldown,
            );
            trace!(
                "CPU {cpu} (max: {}) -> {evaluation:?}",
                settings.cpu_threshold
            );

            if evaluation == CpuEvaluation::Fire {
                let usage = sample.cpu_display().unwrap_or_default();
                let message = format!("Current usage is {usage}");
                debug!("{name}: CPU above {}%", settings.cpu_threshold);

                verdict.notifications.push(Notification::new(
                    server_id,
                    format!("High CPU: {usage}"),
                    &message,
                ));
                verdict
                    .history
                    .push(HistoryEvent::new(now, message, Severity::Warning));
                state.last_cpu_alert = Some(now);
            }
        }

        let transition = StatusTransition::evaluate(state.last_status, sample.status);
        match transition {
            StatusTransition::Unchanged => {}
            StatusTransition::WentOffline if settings.notify_offline => {
                let message = format!("{name} has gone offline.");
                verdict
                    .notifications
                    .push(Notification::new(server_id, "Server Offline", &message));
                verdict
                    .history
                    .push(HistoryEvent::new(now, message, Severity::Error));
            }
            StatusTransition::CameOnline if settings.notify_online => {
                let message = format!("{name} is now online.");
                verdict
                    .notifications
                    .push(Notification::new(server_id, "Server Online", &message));
                verdict
                    .history
                    .push(HistoryEvent::new(now, message, Severity::Success));
            }
            _ => {
                let severity = match sample.status {
                    ServerStatus::Running => Severity::Success,
                    ServerStatus::Offline => Severity::Error,
                    _ => Severity::Info,
                };
                verdict.history.push(HistoryEvent::new(
                    now,
                    format!("Status changed to {}", sample.status),
                    severity,
                ));
            }
        }
        if transition.is_change() {
            debug!("{name}: status {:?} -> {}", state.last_status, sample.status);
        }

        state.last_status = Some(sample.status);
        verdict
    }

    /// Track which source served the last successful fetch
    ///
    /// Returns a notification only when the source actually changes, so a
    /// string of failing cycles reports the fallback once.
    pub fn source_transition(
        &self,
        server_id: &str,
        state: &mut AlertState,
        using_agent: bool,
    ) -> Option<Notification> {
        if state.using_agent == using_agent {
            return None;
        }
        state.using_agent = using_agent;

        Some(if using_agent {
            Notification::new(server_id, "Connected", "Agent connected.")
        } else {
            Notification::new(server_id, "Warning", "Agent unreachable. Using Standard API.")
        })
    }
}

/// Destination for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Publishes notifications on the hub event channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    events: broadcast::Sender<HubEvent>,
}

impl BroadcastSink {
    pub fn new(events: broadcast::Sender<HubEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn notify(&self, notification: &Notification) {
        // No subscribers is fine, the UI may not be listening.
        if self
            .events
            .send(HubEvent::Notification(notification.clone()))
            .is_err()
        {
            trace!("no receivers for notification");
        }
    }
}

/// Logs every notification at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, notification: &Notification) {
        info!(
            server = %notification.server_id,
            "{}: {}", notification.title, notification.message
        );
    }
}

const WEBHOOK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// POSTs notifications as JSON to a configured URL
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    webhook: Webhook,
}

impl WebhookSink {
    pub fn new(webhook: Webhook) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self { client, webhook })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    #[instrument(skip_all, fields(server = %notification.server_id))]
    async fn notify(&self, notification: &Notification) {
        let payload = json!({
            "title": notification.title,
            "message": notification.message,
            "server": notification.server_id,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&self.webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    debug!("webhook notification delivered");
                } else {
                    error!("webhook notification failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("failed to send webhook notification: {e}");
            }
        }
    }
}

/// Delivers to every inner sink concurrently
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, notification: &Notification) {
        join_all(self.sinks.iter().map(|sink| sink.notify(notification))).await;
    }
}
