//! Concurrency tests
//!
//! Foreground and background loops may evaluate the same server at the
//! same moment; a transition must still be acted on once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pretty_assertions::assert_eq;
use vps_watch::ServerStatus;
use vps_watch::actors::PollOrigin;
use vps_watch::storage::{MemoryStore, SettingsStore};
use wiremock::MockServer;

use crate::helpers::*;

async fn offline_server_with_notify() -> (MockServer, Arc<MemoryStore>) {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "offline", 0.0).await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_settings("1", &settings(alerts(false, true, false), None))
        .await
        .unwrap();
    store
        .set_last_status("1", ServerStatus::Running)
        .await
        .unwrap();

    (mock_server, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_foreground_and_background_fire_once() {
    let (mock_server, store) = offline_server_with_notify().await;
    let test = test_pipeline(&mock_server, store.clone());

    let foreground = test.pipeline.clone();
    let background = test.pipeline.clone();
    let (a, b) = tokio::join!(
        foreground.run_cycle("1", PollOrigin::Foreground),
        background.run_cycle("1", PollOrigin::Background),
    );
    tokio_test::assert_ok!(a);
    tokio_test::assert_ok!(b);

    assert_eq!(test.sink.count(), 1);
    assert_eq!(store.history("1").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_cycles_fire_once() {
    let (mock_server, store) = offline_server_with_notify().await;
    let test = test_pipeline(&mock_server, store.clone());

    let tasks = (0..10).map(|n| {
        let pipeline = test.pipeline.clone();
        let origin = if n % 2 == 0 {
            PollOrigin::Foreground
        } else {
            PollOrigin::Background
        };
        tokio::spawn(async move { pipeline.run_cycle("1", origin).await })
    });

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(test.sink.titles(), vec!["Server Offline".to_string()]);
    assert_eq!(store.history("1").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_servers_do_not_block_each_other() {
    let mock_server = MockServer::start().await;
    mount_server(&mock_server, "1", "offline", 0.0).await;
    mount_server(&mock_server, "2", "offline", 0.0).await;

    let store = Arc::new(MemoryStore::new());
    for id in ["1", "2"] {
        store
            .save_settings(id, &settings(alerts(false, true, false), None))
            .await
            .unwrap();
        store
            .set_last_status(id, ServerStatus::Running)
            .await
            .unwrap();
    }
    let test = test_pipeline(&mock_server, store.clone());

    let (a, b) = tokio::join!(
        test.pipeline.run_cycle("1", PollOrigin::Background),
        test.pipeline.run_cycle("2", PollOrigin::Background),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(test.sink.count(), 2);
    assert_eq!(store.history("1").await.unwrap().len(), 1);
    assert_eq!(store.history("2").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_delivery_does_not_block_other_loop() {
    let (mock_server, store) = offline_server_with_notify().await;
    let pipeline = pipeline_with_sink(
        &mock_server,
        store.clone(),
        SlowSink {
            delay: Duration::from_secs(2),
        },
    );

    let foreground = pipeline.clone();
    let delivering =
        tokio::spawn(async move { foreground.run_cycle("1", PollOrigin::Foreground).await });

    // Give the first cycle time to reach delivery
    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = Instant::now();
    let report = pipeline
        .run_cycle("1", PollOrigin::Background)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.verdict.is_empty());

    let first = delivering.await.unwrap().unwrap();
    assert_eq!(first.verdict.notifications.len(), 1);
    assert_eq!(store.history("1").await.unwrap().len(), 1);
}
