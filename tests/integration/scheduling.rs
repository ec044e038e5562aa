//! Poll loop lifecycle
//!
//! - Selecting another server replaces the foreground poller
//! - The background monitor follows the monitored set
//! - Loops survive failing cycles
//! - Rate limited loops slow down instead of speeding up

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::time::sleep;
use vps_watch::actors::{BackgroundHandle, ForegroundHandle, PollTiming, Scheduler};
use vps_watch::config::ResourceSettings;
use vps_watch::error::MonitorError;
use vps_watch::storage::{MemoryStore, SettingsStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_selecting_another_server_stops_the_previous_poller() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    mount_server(&mock_server, "2", "running", 1.0).await;
    let test = test_pipeline(&mock_server, Arc::new(MemoryStore::new()));
    let mut scheduler = Scheduler::new(test.pipeline.clone(), fast_timing());

    scheduler.select("1").await;
    let first: ForegroundHandle = scheduler.foreground().unwrap().clone();

    scheduler.select("2").await;

    assert_eq!(scheduler.selected(), Some("2"));
    assert!(wait_until(|| first.is_stopped()).await);
    assert!(!scheduler.foreground().unwrap().is_stopped());

    scheduler.stop_all().await;
}

#[tokio::test]
async fn test_poll_now_runs_a_cycle() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let test = test_pipeline(&mock_server, Arc::new(MemoryStore::new()));

    let handle = ForegroundHandle::spawn("1", test.pipeline.clone(), fast_timing());

    assert_matches!(handle.poll_now().await, Ok(Ok(())));
    handle.shutdown().await.unwrap();
    assert!(wait_until(|| handle.is_stopped()).await);
}

#[tokio::test]
async fn test_poller_survives_rate_limiting() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/server/1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;
    let test = test_pipeline(&mock_server, Arc::new(MemoryStore::new()));

    let handle = ForegroundHandle::spawn("1", test.pipeline.clone(), fast_timing());

    assert_matches!(handle.poll_now().await, Ok(Err(MonitorError::RateLimited)));
    assert_matches!(handle.poll_now().await, Ok(Err(MonitorError::RateLimited)));
    assert!(!handle.is_stopped());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_background_follows_monitored_set() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let store = Arc::new(MemoryStore::new());
    let test = test_pipeline(&mock_server, store.clone());
    let mut scheduler = Scheduler::new(test.pipeline.clone(), fast_timing());

    assert!(!scheduler.refresh_background().await.unwrap());
    assert!(scheduler.background().is_none());

    store
        .save_settings("1", &settings(alerts(false, true, false), None))
        .await
        .unwrap();
    assert!(scheduler.refresh_background().await.unwrap());
    let background: BackgroundHandle = scheduler.background().unwrap().clone();

    // Turning every flag off stops the monitor at its next cycle
    store
        .save_settings("1", &ResourceSettings::default())
        .await
        .unwrap();
    assert!(wait_until(|| background.is_stopped()).await);
    assert!(scheduler.background().is_none());
    assert!(!scheduler.refresh_background().await.unwrap());
}

#[tokio::test]
async fn test_background_poll_now_counts_servers() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    mount_server(&mock_server, "2", "offline", 0.0).await;
    Mock::given(method("GET"))
        .and(path("/api/server/3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    for id in ["1", "2", "3"] {
        store
            .save_settings(id, &settings(alerts(true, false, false), None))
            .await
            .unwrap();
    }
    let test = test_pipeline(&mock_server, store);

    let handle = BackgroundHandle::spawn(test.pipeline.clone(), fast_timing());

    // The failing server is skipped, the others are polled
    assert_matches!(handle.poll_now().await, Ok(Ok(2)));

    handle.shutdown().await.unwrap();
    assert!(wait_until(|| handle.is_stopped()).await);
}

fn rate_limited_timing() -> PollTiming {
    PollTiming {
        foreground_agent: Duration::from_millis(300),
        foreground_standard: Duration::from_millis(300),
        background: Duration::from_millis(300),
        rate_limit_backoff: Duration::from_millis(300),
    }
}

async fn mount_rate_limited(mock_server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/server/{id}")))
        .respond_with(ResponseTemplate::new(429))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_rate_limited_poller_waits_backoff_and_interval() {
    let mock_server = MockServer::start().await;
    mount_rate_limited(&mock_server, "1").await;
    let test = test_pipeline(&mock_server, Arc::new(MemoryStore::new()));

    let handle = ForegroundHandle::spawn("1", test.pipeline.clone(), rate_limited_timing());

    // First poll at once, the next one only after backoff plus interval
    sleep(Duration::from_millis(450)).await;
    assert_eq!(request_count(&mock_server, "/api/server/1").await, 1);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(request_count(&mock_server, "/api/server/1").await, 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rate_limited_background_pauses_between_servers() {
    let mock_server = MockServer::start().await;
    mount_rate_limited(&mock_server, "1").await;
    mount_rate_limited(&mock_server, "2").await;
    let store = Arc::new(MemoryStore::new());
    for id in ["1", "2"] {
        store
            .save_settings(id, &settings(alerts(true, false, false), None))
            .await
            .unwrap();
    }
    let test = test_pipeline(&mock_server, store);

    let handle = BackgroundHandle::spawn(test.pipeline.clone(), rate_limited_timing());

    sleep(Duration::from_millis(150)).await;
    assert_eq!(request_count(&mock_server, "/api/server/1").await, 1);
    assert_eq!(request_count(&mock_server, "/api/server/2").await, 0);

    // Second server after one backoff, next cycle only after both pauses
    // and the cycle interval
    sleep(Duration::from_millis(600)).await;
    assert_eq!(request_count(&mock_server, "/api/server/1").await, 1);
    assert_eq!(request_count(&mock_server, "/api/server/2").await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_background_restarts_when_monitor_is_exiting() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "running", 1.0).await;
    let store = Arc::new(FlakyStore::new());
    store
        .save_settings("1", &settings(alerts(false, true, false), None))
        .await
        .unwrap();
    let test = test_pipeline(&mock_server, store.clone());
    let mut scheduler = Scheduler::new(test.pipeline.clone(), fast_timing());

    assert!(scheduler.refresh_background().await.unwrap());

    // The monitor's first cycle sees an empty set and is about to exit
    FlakyStore::set(&store.hide_monitored_once, true);
    sleep(Duration::from_millis(50)).await;

    let (monitored, ()) = tokio::join!(scheduler.refresh_background(), async {
        sleep(Duration::from_millis(50)).await;
        store.release.notify_one();
    });
    assert!(monitored.unwrap());

    let mut polled = false;
    for _ in 0..100 {
        if request_count(&mock_server, "/api/server/1").await > 0 {
            polled = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(polled);
    assert!(scheduler.background().is_some());

    scheduler.stop_all().await;
}
