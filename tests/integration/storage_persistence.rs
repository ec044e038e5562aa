//! SQLite persistence across reopen

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vps_watch::ServerStatus;
use vps_watch::actors::PollOrigin;
use vps_watch::config::StorageConfig;
use vps_watch::storage::{self, SettingsStore, Severity};
use wiremock::MockServer;

use crate::helpers::*;

fn sqlite_config(dir: &TempDir) -> StorageConfig {
    StorageConfig::Sqlite {
        path: dir.path().join("vps-watch.db"),
    }
}

#[tokio::test]
async fn test_settings_and_status_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let store = storage::open(&sqlite_config(&dir)).await.unwrap();
    store
        .save_settings("1", &settings(alerts(true, true, false), None))
        .await
        .unwrap();
    store
        .set_last_status("1", ServerStatus::Suspended)
        .await
        .unwrap();
    store.close().await.unwrap();

    let store = storage::open(&sqlite_config(&dir)).await.unwrap();
    assert_eq!(
        store.settings("1").await.unwrap(),
        settings(alerts(true, true, false), None)
    );
    assert_eq!(store.monitored_ids().await.unwrap(), vec!["1".to_string()]);
    assert_eq!(
        store.last_status("1").await.unwrap(),
        Some(ServerStatus::Suspended)
    );
}

#[tokio::test]
async fn test_cycle_history_is_persisted() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "offline", 0.0).await;

    let store = storage::open(&sqlite_config(&dir)).await.unwrap();
    store
        .save_settings("1", &settings(alerts(false, true, false), None))
        .await
        .unwrap();
    store
        .set_last_status("1", ServerStatus::Running)
        .await
        .unwrap();

    let test = test_pipeline(&mock_server, Arc::clone(&store));
    test.pipeline
        .run_cycle("1", PollOrigin::Background)
        .await
        .unwrap();
    store.close().await.unwrap();

    let store = storage::open(&sqlite_config(&dir)).await.unwrap();
    let history = store.history("1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "server-1 has gone offline.");
    assert_eq!(history[0].severity, Severity::Error);
    assert_eq!(
        store.last_status("1").await.unwrap(),
        Some(ServerStatus::Offline)
    );
}
