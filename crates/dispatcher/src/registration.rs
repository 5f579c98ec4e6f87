use std::sync::Arc;

use nmz_common::{
    validate_webhook_url, DeliveryConfig, DeliveryKind, FilterConfig, SignVersion, Subscription,
};
use nmz_signer::{generate_secret, mask_secret, secret_prefix};
use tracing::info;

use crate::{error::RegistrationError, repository::SubscriptionRepository};

#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub user_id: String,
    pub name: String,
    pub url: String,
    /// Issued when absent
    pub secret: Option<String>,
    pub filter: Option<FilterConfig>,
    pub sign_version: SignVersion,
}

/// Validates and stores new webhook subscriptions.
pub struct SubscriptionRegistrar {
    repository: Arc<dyn SubscriptionRepository>,
    allow_localhost: bool,
}

impl SubscriptionRegistrar {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, allow_localhost: bool) -> Self {
        Self { repository, allow_localhost }
    }

    /// Returns the stored subscription, including its secret.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<Subscription, RegistrationError> {
        validate_webhook_url(&request.url, self.allow_localhost)?;

        let secret = match request.secret.filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => generate_secret()?,
        };

        let subscription = Subscription {
            id: String::new(),
            user_id: request.user_id,
            name: request.name,
            filter: request.filter,
            delivery: DeliveryConfig {
                kind: DeliveryKind::Webhook,
                url: request.url,
                secret_prefix: secret_prefix(&secret),
                secret,
                verified: false,
                sign_version: request.sign_version,
            },
        };

        let created = self.repository.create(subscription).await?;
        info!(
            subscription_id = %created.id,
            url = %created.delivery.url,
            secret = %mask_secret(&created.delivery.secret),
            "subscription registered"
        );

        Ok(created)
    }
}
