use std::{sync::Arc, time::Duration};

use eyre::Result;
use nmz_common::{
    config::IngestConfig, DeliveryConfig, FilterConfig, SignVersion, Subscription,
};
use nmz_delivery::{RetryPolicy, RetryingSender, Sender};
use nmz_dispatcher::{
    Dispatcher, MemoryRepository, RegistrationRequest, SubscriptionRegistrar,
};
use nmz_ingest::{Deduplicator, IngestClient};
use nmz_signer::{sign, SignatureVerifier};
use nmz_tests::{
    mock_upstream::start_mock_upstream,
    mock_webhook::{start_mock_webhook, MockWebhookState},
    utils::{quake_frame, setup_test_env, wait_for},
};
use tokio_util::sync::CancellationToken;

fn subscription(id: &str, url: String, filter: Option<FilterConfig>) -> Subscription {
    Subscription {
        id: id.to_string(),
        user_id: "u1".to_string(),
        name: id.to_string(),
        filter,
        delivery: DeliveryConfig {
            url,
            secret: format!("secret-{id}"),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_upstream_frame_reaches_matching_webhooks() -> Result<()> {
    setup_test_env();

    let upstream = start_mock_upstream().await?;
    let all = Arc::new(MockWebhookState::new());
    let miyagi = Arc::new(MockWebhookState::new());
    let strong_only = Arc::new(MockWebhookState::new());
    let all_addr = start_mock_webhook(all.clone()).await?;
    let miyagi_addr = start_mock_webhook(miyagi.clone()).await?;
    let strong_addr = start_mock_webhook(strong_only.clone()).await?;

    let repository = Arc::new(MemoryRepository::with_subscriptions(vec![
        subscription("all", format!("http://{all_addr}/all"), None),
        subscription(
            "miyagi",
            format!("http://{miyagi_addr}/miyagi"),
            Some(FilterConfig { min_scale: 30, prefectures: vec!["宮城".to_string()] }),
        ),
        subscription(
            "strong",
            format!("http://{strong_addr}/strong"),
            Some(FilterConfig { min_scale: 60, prefectures: vec![] }),
        ),
    ]));

    let (ingest, events) =
        IngestClient::new(upstream.url(), &IngestConfig::default(), Deduplicator::default());
    let sender = RetryingSender::new(Sender::new()?, RetryPolicy::default());
    let dispatcher = Dispatcher::new(repository, sender);

    let cancel = CancellationToken::new();
    ingest.connect(&cancel).await?;
    let dispatch_cancel = cancel.clone();
    let dispatch_task = tokio::spawn(async move { dispatcher.run(events, dispatch_cancel).await });
    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() == 1 }).await);

    let frame = quake_frame("e2e-1", 45, &["宮城県", "福島県"]);
    upstream.send_text(frame.clone());
    // repeated by the upstream, delivered once
    upstream.send_text(frame);

    assert!(wait_for(Duration::from_secs(5), || async { all.received() == 1 }).await);
    assert!(wait_for(Duration::from_secs(5), || async { miyagi.received() == 1 }).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(all.received(), 1);
    assert_eq!(strong_only.received(), 0);

    let request = &all.requests()[0];
    assert_eq!(request.header("x-signature-256"), Some(sign("secret-all", &request.body).as_str()));
    let body = request.json();
    assert_eq!(body["_id"], "e2e-1");
    assert_eq!(body["code"], 551);
    assert_eq!(body["earthquake"]["maxScale"], 45);
    assert!(body.get("raw_json").is_none());

    cancel.cancel();
    ingest.close();
    tokio::time::timeout(Duration::from_secs(5), dispatch_task).await??;

    Ok(())
}

#[tokio::test]
async fn test_registered_v0_subscription_receives_verifiable_webhook() -> Result<()> {
    setup_test_env();

    let upstream = start_mock_upstream().await?;
    let receiver = Arc::new(MockWebhookState::new());
    let addr = start_mock_webhook(receiver.clone()).await?;

    let repository = Arc::new(MemoryRepository::new());
    let registrar = SubscriptionRegistrar::new(repository.clone(), true);
    let subscription = registrar
        .register(RegistrationRequest {
            user_id: "u1".to_string(),
            name: "tokyo ops".to_string(),
            url: format!("http://127.0.0.1:{}/hook", addr.port()),
            filter: Some(FilterConfig { min_scale: 10, prefectures: vec!["東京都".to_string()] }),
            sign_version: SignVersion::V0,
            ..Default::default()
        })
        .await?;
    let secret = subscription.delivery.secret.clone();

    let (ingest, events) =
        IngestClient::new(upstream.url(), &IngestConfig::default(), Deduplicator::default());
    let dispatcher =
        Dispatcher::new(repository, RetryingSender::new(Sender::new()?, RetryPolicy::default()));

    let cancel = CancellationToken::new();
    ingest.connect(&cancel).await?;
    let dispatch_cancel = cancel.clone();
    tokio::spawn(async move { dispatcher.run(events, dispatch_cancel).await });
    assert!(wait_for(Duration::from_secs(5), || async { upstream.connections() == 1 }).await);

    upstream.send_text(quake_frame("osaka-only", 40, &["大阪府"]));
    upstream.send_text(quake_frame("tokyo", 30, &["東京都"]));

    assert!(wait_for(Duration::from_secs(5), || async { receiver.received() == 1 }).await);

    let request = &receiver.requests()[0];
    assert_eq!(request.json()["_id"], "tokyo");
    let verified = SignatureVerifier::default().verify_headers(
        &secret,
        request.header("x-signature-256").unwrap_or_default(),
        request.header("x-signature-timestamp"),
        &request.body,
    );
    assert_eq!(verified, Ok(()));

    cancel.cancel();
    Ok(())
}
