//! Agent fallback and reconnect behavior
//!
//! - A failing agent is reported once, not once per cycle
//! - The failing cycle is still served by the control panel
//! - Recovery is reported once as well

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vps_watch::actors::PollOrigin;
use vps_watch::coordinator::Source;
use vps_watch::storage::{MemoryStore, SettingsStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_failing_then_recovering_agent_notifies_once_each() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 3.0).await;

    // Three failing answers first, then healthy ones
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json(40.0)))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(
            "1",
            &settings(alerts(false, false, false), Some(agent_for(&mock_server))),
        )
        .await
        .unwrap();
    let test = test_pipeline(&mock_server, store);

    let mut sources = vec![];
    for _ in 0..5 {
        let report = test
            .pipeline
            .run_cycle("1", PollOrigin::Foreground)
            .await
            .unwrap();
        sources.push((report.source, report.fell_back));
    }

    assert_eq!(
        sources,
        vec![
            (Source::Standard, true),
            (Source::Standard, true),
            (Source::Standard, true),
            (Source::Agent, false),
            (Source::Agent, false),
        ]
    );
    assert_eq!(
        test.sink.titles(),
        vec!["Warning".to_string(), "Connected".to_string()]
    );
}

#[tokio::test]
async fn test_agent_timeout_falls_back_within_the_cycle() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 7.0).await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(agent_json(40.0))
                .set_delay(AGENT_TIMEOUT + Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(
            "1",
            &settings(alerts(true, false, false), Some(agent_for(&mock_server))),
        )
        .await
        .unwrap();
    let test = test_pipeline(&mock_server, store);

    let report = test
        .pipeline
        .run_cycle("1", PollOrigin::Foreground)
        .await
        .unwrap();

    assert_eq!(report.source, Source::Standard);
    assert!(report.fell_back);
    assert_eq!(report.snapshot.sample.cpu, Some(7.0));
    assert_eq!(test.sink.titles(), vec!["Warning".to_string()]);
}

#[tokio::test]
async fn test_agent_values_win_over_panel() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 3.0).await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json(91.5)))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(
            "1",
            &settings(alerts(true, false, false), Some(agent_for(&mock_server))),
        )
        .await
        .unwrap();
    let test = test_pipeline(&mock_server, store);

    let report = test
        .pipeline
        .run_cycle("1", PollOrigin::Foreground)
        .await
        .unwrap();

    assert_eq!(report.source, Source::Agent);
    assert_eq!(report.snapshot.sample.cpu, Some(91.5));
    assert_eq!(report.snapshot.sample.uptime, Some(3600));
    assert!(report.snapshot.sample.network.is_some());
    // Agent was assumed reachable from the start, so no reconnect notice
    assert_eq!(test.sink.titles(), vec!["High CPU: 91.50 %".to_string()]);
}
