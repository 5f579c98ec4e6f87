//! HMAC-SHA256 webhook signatures.
//!
//! Two schemes are produced:
//! - legacy: `sha256=<hex>` over the raw body
//! - `v0`: `v0=<hex>` over `v0:<unix-seconds>:<body>`, sent together with
//!   the timestamp so receivers can enforce a freshness window

use std::time::Duration;

use hmac::{Hmac, Mac};
use nmz_common::{config::SignerConfig, SignVersion};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature-256";
pub const TIMESTAMP_HEADER: &str = "X-Signature-Timestamp";

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FUTURE_SKEW: Duration = Duration::from_secs(60);

const LEGACY_PREFIX: &str = "sha256=";
const V0_PREFIX: &str = "v0=";

fn hmac_hex(secret: &str, parts: &[&[u8]]) -> String {
    // HMAC accepts keys of any length, including empty ones
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}

/// Legacy body-only signature.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    format!("{LEGACY_PREFIX}{}", hmac_hex(secret, &[payload]))
}

/// Timestamped `v0` signature.
pub fn sign_v0(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let timestamp = timestamp.to_string();
    format!("{V0_PREFIX}{}", hmac_hex(secret, &[b"v0:", timestamp.as_bytes(), b":", payload]))
}

/// Signs with the scheme a target asked for. The timestamp is ignored by
/// the legacy scheme.
pub fn sign_with(version: SignVersion, secret: &str, timestamp: i64, payload: &[u8]) -> String {
    match version {
        SignVersion::Legacy => sign(secret, payload),
        SignVersion::V0 => sign_v0(secret, timestamp, payload),
    }
}

pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign(secret, payload);
    constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// Verifies a `v0` signature against the current clock, tolerating the
/// default 60 second future skew.
pub fn verify_v0(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
    signature: &str,
    max_age: Duration,
) -> bool {
    SignatureVerifier::new(max_age, DEFAULT_FUTURE_SKEW)
        .verify_v0_at(secret, timestamp, payload, signature, chrono::Utc::now().timestamp())
        .is_ok()
}

/// Receiver-side verification with a configurable freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureVerifier {
    max_age: Duration,
    future_skew: Duration,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE, DEFAULT_FUTURE_SKEW)
    }
}

impl From<&SignerConfig> for SignatureVerifier {
    fn from(config: &SignerConfig) -> Self {
        Self::new(config.max_age(), config.future_skew())
    }
}

impl SignatureVerifier {
    pub fn new(max_age: Duration, future_skew: Duration) -> Self {
        Self { max_age, future_skew }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn future_skew(&self) -> Duration {
        self.future_skew
    }

    pub fn verify_v0_at(
        &self,
        secret: &str,
        timestamp: i64,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let skew = i64::try_from(self.future_skew.as_secs()).unwrap_or(i64::MAX);

        if now.saturating_sub(timestamp) > max_age {
            return Err(SignatureError::Expired);
        }
        if timestamp > now.saturating_add(skew) {
            return Err(SignatureError::FromFuture);
        }

        let expected = sign_v0(secret, timestamp, payload);
        if constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Verifies the header pair of a received webhook, picking the scheme
    /// from the signature prefix.
    pub fn verify_headers(
        &self,
        secret: &str,
        signature: &str,
        timestamp: Option<&str>,
        payload: &[u8],
    ) -> Result<(), SignatureError> {
        if signature.starts_with(LEGACY_PREFIX) {
            return if verify(secret, payload, signature) {
                Ok(())
            } else {
                Err(SignatureError::Mismatch)
            };
        }

        if signature.starts_with(V0_PREFIX) {
            let raw = timestamp.ok_or(SignatureError::MissingTimestamp)?;
            let timestamp = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| SignatureError::InvalidTimestamp(raw.to_string()))?;
            return self.verify_v0_at(
                secret,
                timestamp,
                payload,
                signature,
                chrono::Utc::now().timestamp(),
            );
        }

        Err(SignatureError::UnknownScheme)
    }
}
