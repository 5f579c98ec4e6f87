pub mod error;
pub mod http_client;
pub mod metrics;
pub mod retry;
pub mod sender;

pub use error::DeliveryError;
pub use http_client::HttpClientFactory;
pub use retry::{RetryPolicy, RetryingSender};
pub use sender::{Deliver, Sender, DEFAULT_TIMEOUT};
