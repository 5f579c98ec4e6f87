use std::sync::Arc;

use async_trait::async_trait;
use nmz_common::Subscription;
use parking_lot::RwLock;

use crate::error::RepositoryError;

/// Storage for subscriptions. The dispatcher only ever calls `list`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Subscription>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Subscription, RepositoryError>;

    /// Stores a new subscription, assigning an ID when it has none.
    async fn create(&self, subscription: Subscription) -> Result<Subscription, RepositoryError>;

    async fn update(&self, subscription: Subscription) -> Result<Subscription, RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    async fn list_by_user_id(&self, user_id: &str) -> Result<Vec<Subscription>, RepositoryError>;
}

/// Read-only subscriptions fixed at startup from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRepository {
    subscriptions: Arc<[Subscription]>,
}

impl StaticRepository {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions: subscriptions.into() }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[async_trait]
impl SubscriptionRepository for StaticRepository {
    async fn list(&self) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(self.subscriptions.to_vec())
    }

    async fn get(&self, id: &str) -> Result<Subscription, RepositoryError> {
        self.subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn create(&self, _: Subscription) -> Result<Subscription, RepositoryError> {
        Err(RepositoryError::ReadOnly)
    }

    async fn update(&self, _: Subscription) -> Result<Subscription, RepositoryError> {
        Err(RepositoryError::ReadOnly)
    }

    async fn delete(&self, _: &str) -> Result<(), RepositoryError> {
        Err(RepositoryError::ReadOnly)
    }

    /// Configured subscriptions have no owner, so this is always empty.
    async fn list_by_user_id(&self, _: &str) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(Vec::new())
    }
}

/// Read/write subscriptions held in process memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions: RwLock::new(subscriptions) }
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryRepository {
    async fn list(&self) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(self.subscriptions.read().clone())
    }

    async fn get(&self, id: &str) -> Result<Subscription, RepositoryError> {
        self.subscriptions
            .read()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn create(&self, mut subscription: Subscription) -> Result<Subscription, RepositoryError> {
        if subscription.id.is_empty() {
            subscription.id = uuid::Uuid::new_v4().to_string();
        }

        let mut subscriptions = self.subscriptions.write();
        if subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(RepositoryError::Conflict(subscription.id));
        }
        subscriptions.push(subscription.clone());

        Ok(subscription)
    }

    async fn update(&self, subscription: Subscription) -> Result<Subscription, RepositoryError> {
        let mut subscriptions = self.subscriptions.write();
        let existing = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| RepositoryError::NotFound(subscription.id.clone()))?;
        *existing = subscription.clone();

        Ok(subscription)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);

        if subscriptions.len() == before {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_by_user_id(&self, user_id: &str) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(self.subscriptions.read().iter().filter(|s| s.user_id == user_id).cloned().collect())
    }
}
