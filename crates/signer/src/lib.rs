pub mod error;
pub mod secret;
pub mod signature;

pub use error::{SignatureError, SignerError};
pub use secret::{generate_secret, mask_secret, secret_prefix, SECRET_LENGTH, SECRET_PREFIX};
pub use signature::{
    sign, sign_v0, sign_with, verify, verify_v0, SignatureVerifier, DEFAULT_FUTURE_SKEW,
    DEFAULT_MAX_AGE, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
