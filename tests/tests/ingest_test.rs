use std::time::Duration;

use eyre::Result;
use nmz_common::config::IngestConfig;
use nmz_ingest::{Deduplicator, IngestClient, IngestError};
use nmz_tests::{
    mock_upstream::start_mock_upstream,
    utils::{quake_frame, setup_test_env, wait_for},
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn fast_config() -> IngestConfig {
    IngestConfig {
        max_retries: 3,
        initial_retry_delay_ms: 50,
        max_retry_delay_ms: 200,
        ..IngestConfig::default()
    }
}

#[tokio::test]
async fn test_frames_are_filtered_and_deduplicated() -> Result<()> {
    setup_test_env();
    let upstream = start_mock_upstream().await?;
    let (client, mut events) =
        IngestClient::new(upstream.url(), &fast_config(), Deduplicator::default());

    let cancel = CancellationToken::new();
    client.connect(&cancel).await?;
    assert!(client.is_connected());
    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() == 1 }).await);

    upstream.send_text(quake_frame("a", 40, &["宮城県"]));
    upstream.send_text(quake_frame("a", 40, &["宮城県"]));
    upstream.send_text(r#"{"_id":"t-1","code":552}"#);
    upstream.send_text("not json");
    upstream.send_binary(vec![1, 2, 3]);
    upstream.send_text(quake_frame("b", 50, &["岩手県"]));

    let first = timeout(Duration::from_secs(5), events.recv()).await?.expect("event a");
    let second = timeout(Duration::from_secs(5), events.recv()).await?.expect("event b");
    assert_eq!(first.id(), "a");
    assert_eq!(second.id(), "b");
    assert_eq!(second.affected_areas(), vec!["岩手県".to_string()]);
    assert!(!second.raw_json().is_empty());

    assert!(timeout(Duration::from_millis(300), events.recv()).await.is_err());

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_upstream_drop() -> Result<()> {
    setup_test_env();
    let upstream = start_mock_upstream().await?;
    let (client, mut events) =
        IngestClient::new(upstream.url(), &fast_config(), Deduplicator::default());

    let cancel = CancellationToken::new();
    client.connect(&cancel).await?;
    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() == 1 }).await);

    upstream.disconnect_all();
    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() == 2 }).await);
    assert!(wait_for(Duration::from_secs(5), || async { client.is_connected() }).await);
    assert!(wait_for(Duration::from_secs(2), || async { client.reconnect_count() == 1 }).await);

    upstream.send_text(quake_frame("after-drop", 30, &["東京都"]));
    let event = timeout(Duration::from_secs(5), events.recv()).await?.expect("event");
    assert_eq!(event.id(), "after-drop");

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn test_scheduled_rotation_keeps_single_connection() -> Result<()> {
    setup_test_env();
    let upstream = start_mock_upstream().await?;
    let config = IngestConfig { reconnect_interval_secs: 1, ..fast_config() };
    let (client, _events) = IngestClient::new(upstream.url(), &config, Deduplicator::default());

    let cancel = CancellationToken::new();
    client.connect(&cancel).await?;

    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() >= 3 }).await);
    assert!(wait_for(Duration::from_secs(2), || async { client.reconnect_count() >= 2 }).await);
    assert!(wait_for(Duration::from_secs(2), || async { upstream.open_connections() == 1 }).await);

    cancel.cancel();
    assert!(wait_for(Duration::from_secs(5), || async { upstream.open_connections() == 0 }).await);
    Ok(())
}

#[tokio::test]
async fn test_connect_gives_up_after_max_retries() -> Result<()> {
    setup_test_env();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let (client, _events) =
        IngestClient::new(format!("ws://{addr}"), &fast_config(), Deduplicator::default());

    let started = std::time::Instant::now();
    let err = client.connect(&CancellationToken::new()).await.unwrap_err();

    match err {
        IngestError::Connect { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
    // 50ms + 100ms between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(!client.is_connected());

    Ok(())
}

#[tokio::test]
async fn test_close_stops_ingestion() -> Result<()> {
    setup_test_env();
    let upstream = start_mock_upstream().await?;
    let (client, mut events) =
        IngestClient::new(upstream.url(), &fast_config(), Deduplicator::default());

    client.connect(&CancellationToken::new()).await?;
    assert!(wait_for(Duration::from_secs(5), || async { upstream.open_connections() == 1 }).await);

    client.close();
    client.close();

    assert!(wait_for(Duration::from_secs(5), || async { upstream.open_connections() == 0 }).await);
    assert!(wait_for(Duration::from_secs(5), || async { !client.is_connected() }).await);

    upstream.send_text(quake_frame("late", 30, &[]));
    assert!(timeout(Duration::from_millis(300), events.recv()).await.ok().flatten().is_none());

    Ok(())
}
