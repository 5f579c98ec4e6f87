pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod registration;
pub mod repository;

pub use dispatcher::Dispatcher;
pub use error::{RegistrationError, RepositoryError};
pub use registration::{RegistrationRequest, SubscriptionRegistrar};
pub use repository::{MemoryRepository, StaticRepository, SubscriptionRepository};
