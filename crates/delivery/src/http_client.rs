use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::DeliveryError;

const USER_AGENT: &str = concat!("namazu-webhook/", env!("CARGO_PKG_VERSION"));

/// Builds pooled HTTP clients for webhook delivery
pub struct HttpClientFactory {
    timeout: Duration,
    max_idle_per_host: usize,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, max_idle_per_host: 10 }
    }

    pub fn with_max_idle_per_host(mut self, max_idle_per_host: usize) -> Self {
        self.max_idle_per_host = max_idle_per_host;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Redirects are not followed: a webhook answering 3xx is treated as a
    /// failed delivery rather than re-posting the payload elsewhere.
    pub fn create_client(&self) -> Result<Client, DeliveryError> {
        if self.timeout.is_zero() {
            return Err(DeliveryError::InvalidSettings("timeout must be greater than zero".into()));
        }

        Ok(ClientBuilder::new()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?)
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(crate::sender::DEFAULT_TIMEOUT)
    }
}
