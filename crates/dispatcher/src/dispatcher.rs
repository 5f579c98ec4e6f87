use std::sync::Arc;

use bytes::Bytes;
use eyre::{Result, WrapErr};
use nmz_common::{filter, DeliveryResult, Event, SharedEvent, Target};
use nmz_delivery::{Deliver, RetryingSender, Sender};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    metrics::{DISPATCH_EVENTS, DISPATCH_MATCHED_TARGETS},
    repository::SubscriptionRepository,
};

/// Single consumer of the ingestion channel. Fans every event out to the
/// webhook targets whose filters match it.
pub struct Dispatcher<S = Sender> {
    repository: Arc<dyn SubscriptionRepository>,
    sender: RetryingSender<S>,
}

impl<S: Deliver> Dispatcher<S> {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, sender: RetryingSender<S>) -> Self {
        Self { repository, sender }
    }

    /// Drains `events` until `cancel` fires or the channel closes. A failed
    /// dispatch is logged and does not stop the loop.
    pub async fn run(&self, mut events: mpsc::Receiver<SharedEvent>, cancel: CancellationToken) {
        info!("dispatcher started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(err) = self.dispatch(&cancel, event.as_ref()).await {
                error!(event_id = %event.id(), error = ?err, "dispatch failed");
            }
        }

        info!("dispatcher stopped");
    }

    /// Delivers one event to every matching target. Results are aligned
    /// with the matching subscriptions in repository order.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        event: &dyn Event,
    ) -> Result<Vec<DeliveryResult>> {
        DISPATCH_EVENTS.inc();

        let subscriptions =
            self.repository.list().await.wrap_err("failed to list subscriptions")?;

        let targets: Vec<Target> = subscriptions
            .iter()
            .filter(|s| filter::matches(s.filter.as_ref(), event))
            .filter_map(|s| s.target())
            .collect();

        if targets.is_empty() {
            debug!(event_id = %event.id(), subscriptions = subscriptions.len(), "no matching subscriptions");
            return Ok(Vec::new());
        }
        DISPATCH_MATCHED_TARGETS.inc_by(targets.len() as u64);

        let payload = event.to_payload().wrap_err("failed to serialize event payload")?;
        let results = self.sender.send_all(cancel, &targets, Bytes::from(payload)).await;

        let delivered = results.iter().filter(|r| r.success).count();
        info!(
            event_id = %event.id(),
            severity = event.severity(),
            targets = targets.len(),
            delivered,
            failed = results.len() - delivered,
            "event dispatched"
        );

        Ok(results)
    }
}
