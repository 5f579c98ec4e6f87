use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to generate webhook secret: {0}")]
    SecretGeneration(String),
}

/// Reasons a received signature is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unknown signature scheme")]
    UnknownScheme,

    #[error("missing signature timestamp")]
    MissingTimestamp,

    #[error("invalid signature timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("signature timestamp too old")]
    Expired,

    #[error("signature timestamp too far in the future")]
    FromFuture,

    #[error("signature mismatch")]
    Mismatch,
}
