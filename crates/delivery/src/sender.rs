use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use nmz_common::{DeliveryResult, SignVersion, Target};
use nmz_signer::{sign_with, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use reqwest::{header::CONTENT_TYPE, Client};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::DeliveryError, http_client::HttpClientFactory, metrics::record_attempt};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single delivery attempt of a payload to one target.
///
/// Failures are reported through the returned [`DeliveryResult`], never as
/// errors.
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    async fn deliver(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        payload: &Bytes,
    ) -> DeliveryResult;
}

/// Signs and POSTs webhook payloads
#[derive(Debug, Clone)]
pub struct Sender {
    client: Client,
}

impl Sender {
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self { client: HttpClientFactory::new(timeout).create_client()? })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Delivers with the legacy body-only signature.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        url: &str,
        secret: &str,
        payload: &Bytes,
    ) -> DeliveryResult {
        self.send_target(cancel, &Target::new(url, secret), payload).await
    }

    pub async fn send_target(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        payload: &Bytes,
    ) -> DeliveryResult {
        let start = Instant::now();

        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_with(target.sign_version, &target.secret, timestamp, payload);

        let mut request = self
            .client
            .post(&target.url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature);
        if target.sign_version == SignVersion::V0 {
            request = request.header(TIMESTAMP_HEADER, timestamp.to_string());
        }
        let request = request.body(payload.clone());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = request.send() => Some(response),
        };

        let mut result = match outcome {
            None => DeliveryResult::cancelled(&target.url, "context cancelled during request"),
            Some(Ok(response)) => {
                let status = response.status();
                let success = status.is_success();
                DeliveryResult {
                    url: target.url.clone(),
                    status_code: status.as_u16(),
                    success,
                    error_message: if success { String::new() } else { format!("HTTP {status}") },
                    ..Default::default()
                }
            }
            Some(Err(err)) => DeliveryResult::failure(&target.url, describe_transport_error(&err)),
        };
        result.response_time = start.elapsed();

        debug!(
            url = %target.url,
            status_code = result.status_code,
            success = result.success,
            elapsed_ms = result.response_time.as_millis() as u64,
            "webhook attempt finished"
        );
        record_attempt(&result);

        result
    }
}

#[async_trait]
impl Deliver for Sender {
    async fn deliver(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        payload: &Bytes,
    ) -> DeliveryResult {
        self.send_target(cancel, target, payload).await
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timeout: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else if err.is_builder() {
        format!("invalid request: {err}")
    } else {
        err.to_string()
    }
}
