pub mod backoff;
pub mod config;
pub mod event;
pub mod filter;
pub mod metrics;
pub mod types;
pub mod validation;

pub use backoff::ExponentialBackoff;
pub use config::{load_config, load_from_env, ConfigError, NamazuConfig, CONFIG_ENV};
pub use event::{Event, EventType, SharedEvent};
pub use filter::matches;
pub use types::{
    DeliveryConfig, DeliveryKind, DeliveryResult, FailureKind, FilterConfig, SignVersion,
    Subscription, Target,
};
pub use validation::{validate_webhook_url, UrlValidationError};
