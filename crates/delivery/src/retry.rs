use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use nmz_common::{config::RetryConfig, DeliveryResult, ExponentialBackoff, Target};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    metrics::{record_result, DELIVERY_RETRIES},
    sender::{Deliver, Sender},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
    /// Bound on in-flight deliveries within one `send_all`
    pub max_concurrency: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_retries: config.max_retries,
            backoff: config.backoff(),
            max_concurrency: config.max_concurrency,
        }
    }
}

/// Retries retryable failures per target with exponential backoff and fans
/// deliveries out over many targets.
pub struct RetryingSender<S = Sender> {
    inner: Arc<S>,
    policy: RetryPolicy,
    limiter: Option<Arc<Semaphore>>,
}

impl<S> Clone for RetryingSender<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: self.policy, limiter: self.limiter.clone() }
    }
}

impl<S: Deliver> RetryingSender<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self::from_arc(Arc::new(inner), policy)
    }

    pub fn from_arc(inner: Arc<S>, policy: RetryPolicy) -> Self {
        let limiter = policy.max_concurrency.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        Self { inner, policy, limiter }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn send(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        payload: &Bytes,
    ) -> DeliveryResult {
        let result = self.send_with_retry(cancel, target, payload).await;
        record_result(&result);

        if !result.success && !result.cancelled {
            error!(
                url = %target.url,
                name = %target.name,
                status_code = result.status_code,
                retry_count = result.retry_count,
                error = %result.error_message,
                "webhook delivery failed"
            );
        }

        result
    }

    async fn send_with_retry(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        payload: &Bytes,
    ) -> DeliveryResult {
        if !self.policy.enabled {
            let mut result = self.inner.deliver(cancel, target, payload).await;
            result.retry_count = 0;
            return result;
        }

        let mut last = None;

        for attempt in 0..=self.policy.max_retries {
            let retries_so_far = attempt.saturating_sub(1);

            if cancel.is_cancelled() {
                return cancelled(target, "context cancelled before attempt", retries_so_far);
            }

            if attempt > 0 {
                let delay = self.policy.backoff.delay(attempt - 1);
                debug!(url = %target.url, attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return cancelled(target, "context cancelled during backoff", retries_so_far);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                DELIVERY_RETRIES.inc();
            }

            let mut result = self.inner.deliver(cancel, target, payload).await;
            result.retry_count = attempt;

            if result.success || !result.is_retryable() {
                return result;
            }

            warn!(
                url = %target.url,
                attempt,
                status_code = result.status_code,
                error = %result.error_message,
                "retryable webhook failure"
            );
            last = Some(result);
        }

        last.unwrap_or_else(|| DeliveryResult::failure(&target.url, "no delivery attempt made"))
    }

    /// Delivers `payload` to every target concurrently. Results are
    /// index-aligned with `targets`.
    pub async fn send_all(
        &self,
        cancel: &CancellationToken,
        targets: &[Target],
        payload: Bytes,
    ) -> Vec<DeliveryResult> {
        if targets.is_empty() {
            return Vec::new();
        }

        let handles = targets.iter().cloned().map(|target| {
            let sender = self.clone();
            let cancel = cancel.clone();
            let payload = payload.clone();

            tokio::spawn(async move {
                let _permit = match &sender.limiter {
                    Some(limiter) => tokio::select! {
                        _ = cancel.cancelled() => {
                            return cancelled(&target, "context cancelled before attempt", 0);
                        }
                        permit = limiter.clone().acquire_owned() => permit.ok(),
                    },
                    None => None,
                };

                sender.send(&cancel, &target, &payload).await
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| match joined {
                Ok(result) => result,
                Err(err) => {
                    error!(url = %target.url, error = %err, "delivery task failed");
                    DeliveryResult::failure(&target.url, format!("delivery task failed: {err}"))
                }
            })
            .collect()
    }
}

fn cancelled(target: &Target, message: &str, retry_count: u32) -> DeliveryResult {
    DeliveryResult { retry_count, ..DeliveryResult::cancelled(&target.url, message) }
}
