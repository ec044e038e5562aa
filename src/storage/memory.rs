//! In-memory settings store (no persistence)
//!
//! Useful for tests and for running without a database file. All data is
//! lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::ServerStatus;
use crate::config::ResourceSettings;

use super::backend::SettingsStore;
use super::error::StorageResult;
use super::history::{self, HistoryEvent};

#[derive(Debug, Default)]
struct Inner {
    settings: HashMap<String, ResourceSettings>,
    last_status: HashMap<String, ServerStatus>,
    history: HashMap<String, Vec<HistoryEvent>>,
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn settings(&self, server_id: &str) -> StorageResult<ResourceSettings> {
        Ok(self
            .inner
            .read()
            .await
            .settings
            .get(server_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_settings(
        &self,
        server_id: &str,
        settings: &ResourceSettings,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if *settings == ResourceSettings::default() {
            trace!("{server_id}: settings back to defaults, removing record");
            inner.settings.remove(server_id);
        } else {
            inner
                .settings
                .insert(server_id.to_string(), settings.clone());
        }
        Ok(())
    }

    async fn monitored_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<_> = self
            .inner
            .read()
            .await
            .settings
            .iter()
            .filter(|(_, settings)| settings.is_monitored())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn last_status(&self, server_id: &str) -> StorageResult<Option<ServerStatus>> {
        Ok(self.inner.read().await.last_status.get(server_id).copied())
    }

    async fn set_last_status(&self, server_id: &str, status: ServerStatus) -> StorageResult<()> {
        self.inner
            .write()
            .await
            .last_status
            .insert(server_id.to_string(), status);
        Ok(())
    }

    async fn append_history(&self, server_id: &str, event: HistoryEvent) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let events = inner.history.entry(server_id.to_string()).or_default();
        events.insert(0, event);
        history::retain(events, Utc::now());
        Ok(())
    }

    async fn history(&self, server_id: &str) -> StorageResult<Vec<HistoryEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .history
            .get(server_id)
            .map(|events| history::visible(events, Utc::now()))
            .unwrap_or_default())
    }

    async fn clear_history(&self, server_id: &str) -> StorageResult<()> {
        self.inner.write().await.history.remove(server_id);
        Ok(())
    }
}
