use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid delivery settings: {0}")]
    InvalidSettings(String),
}
