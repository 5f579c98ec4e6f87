use nmz_common::UrlValidationError;
use nmz_signer::SignerError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("subscription {0} not found")]
    NotFound(String),

    #[error("subscription repository is read-only")]
    ReadOnly,

    #[error("subscription {0} already exists")]
    Conflict(String),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Secret(#[from] SignerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RegistrationError {
    /// Rejected because the URL points at the local machine or a private
    /// network, as opposed to being malformed.
    pub fn is_ssrf(&self) -> bool {
        matches!(
            self,
            RegistrationError::InvalidUrl(
                UrlValidationError::LocalhostNotAllowed | UrlValidationError::PrivateAddress(_)
            )
        )
    }
}
