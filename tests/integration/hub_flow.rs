//! Hub facade end to end against a mocked control panel

use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use vps_watch::actors::HubEvent;
use vps_watch::config::{Config, ResourceSettings};
use vps_watch::error::MonitorError;
use vps_watch::hub::Hub;
use vps_watch::storage::{MemoryStore, SettingsStore};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn hub_for(mock_server: &MockServer, store: Arc<MemoryStore>) -> Hub {
    mount_account(mock_server).await;
    Hub::build(
        &Config::default(),
        coordinator_for(mock_server),
        store,
        fast_timing(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_rejected_key_fails_connect() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let result = Hub::build(
        &Config::default(),
        coordinator_for(&mock_server),
        Arc::new(MemoryStore::new()),
        fast_timing(),
    )
    .await;

    assert_matches!(result, Err(MonitorError::Auth));
}

#[tokio::test]
async fn test_settings_round_trip_and_monitoring() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let hub = hub_for(&mock_server, Arc::new(MemoryStore::new())).await;

    assert_eq!(hub.account().name, "Test User");
    assert!(!hub.is_monitoring().await);

    let alerts = alerts(true, true, false);
    hub.update_alert_settings("1", alerts.clone()).await.unwrap();

    assert_eq!(hub.settings("1").await.unwrap().alerts, alerts);
    assert!(hub.is_monitoring().await);

    hub.update_alert_settings("1", ResourceSettings::default().alerts)
        .await
        .unwrap();
    assert!(!hub.is_monitoring().await);
    assert_eq!(hub.settings("1").await.unwrap(), ResourceSettings::default());

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_resumes_monitoring() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let store = Arc::new(MemoryStore::new());
    store
        .save_settings("1", &settings(alerts(false, true, true), None))
        .await
        .unwrap();

    let hub = hub_for(&mock_server, store).await;

    assert!(hub.is_monitoring().await);
    hub.logout().await;
    assert!(!hub.is_monitoring().await);
}

#[tokio::test]
async fn test_unknown_power_action_is_rejected() {
    let mock_server = MockServer::start().await;
    let hub = hub_for(&mock_server, Arc::new(MemoryStore::new())).await;

    let result = hub.power_action("1", "reboot").await;

    assert_matches!(result, Err(MonitorError::Configuration(_)));
}

#[tokio::test]
async fn test_power_action_refreshes_viewed_server() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    Mock::given(method("POST"))
        .and(path("/api/server/1/powerOff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
        .expect(1)
        .mount(&mock_server)
        .await;
    let hub = hub_for(&mock_server, Arc::new(MemoryStore::new())).await;
    let mut events = hub.subscribe();

    hub.select_server("1").await;
    hub.power_action("1", "kill").await.unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(event, HubEvent::Sample(sample) if sample.server_id == "1");

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_servers_and_history() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/server"))
        .and(query_param("results", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"id": 1, "name": "alpha", "suspended": false, "storage": []},
                {"id": 2, "name": "beta", "suspended": true, "storage": []}
            ],
            "current_page": 1,
            "last_page": 1
        })))
        .mount(&mock_server)
        .await;
    mount_server(&mock_server, "1", "offline", 0.0).await;
    let store = Arc::new(MemoryStore::new());
    store
        .set_last_status("1", vps_watch::ServerStatus::Running)
        .await
        .unwrap();
    let hub = hub_for(&mock_server, store).await;

    let servers = hub.list_servers().await.unwrap();
    let names: Vec<_> = servers.iter().map(|s| s.info.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(servers.iter().all(|s| !s.has_state));

    hub.refresh("1").await.unwrap();
    assert_eq!(hub.history("1").await.unwrap().len(), 1);

    hub.clear_history("1").await.unwrap();
    assert!(hub.history("1").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_keep_both_changes() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let hub = hub_for(&mock_server, Arc::new(MemoryStore::new())).await;
    let agent = agent_for(&mock_server);

    for _ in 0..20 {
        let (a, b) = tokio::join!(
            hub.update_alert_settings("1", alerts(true, false, false)),
            hub.save_agent_settings("1", agent.clone()),
        );
        a.unwrap();
        b.unwrap();

        let saved = hub.settings("1").await.unwrap();
        assert_eq!(saved, settings(alerts(true, false, false), Some(agent.clone())));

        hub.update_alert_settings("1", ResourceSettings::default().alerts)
            .await
            .unwrap();
        hub.save_agent_settings("1", ResourceSettings::default().agent)
            .await
            .unwrap();
    }

    hub.shutdown().await.unwrap();
}
