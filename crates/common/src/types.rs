use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Subscriber-side matching criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Threshold on the source's native scale; `0` or less disables it.
    #[serde(default)]
    pub min_scale: i32,
    /// Prefecture names or prefixes; empty disables the constraint.
    #[serde(default)]
    pub prefectures: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Webhook,
}

/// Signature scheme attached to outgoing webhooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignVersion {
    /// `sha256=<hex>` over the body only.
    #[default]
    #[serde(rename = "")]
    Legacy,
    /// `v0=<hex>` over `v0:<timestamp>:<body>`.
    #[serde(rename = "v0")]
    V0,
}

impl SignVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignVersion::Legacy => "",
            SignVersion::V0 => "v0",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default, rename = "type")]
    pub kind: DeliveryKind,
    pub url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub secret_prefix: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub sign_version: SignVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    pub delivery: DeliveryConfig,
}

impl Subscription {
    /// Derives the per-dispatch destination, if this subscription delivers
    /// over webhooks.
    pub fn target(&self) -> Option<Target> {
        match self.delivery.kind {
            DeliveryKind::Webhook if !self.delivery.url.is_empty() => Some(Target {
                url: self.delivery.url.clone(),
                secret: self.delivery.secret.clone(),
                name: self.name.clone(),
                sign_version: self.delivery.sign_version,
            }),
            DeliveryKind::Webhook => None,
        }
    }
}

/// Destination of a single webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub secret: String,
    pub name: String,
    pub sign_version: SignVersion,
}

impl Target {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { url: url.into(), secret: secret.into(), ..Default::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sign_version(mut self, sign_version: SignVersion) -> Self {
        self.sign_version = sign_version;
        self
    }
}

/// Classification of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Transport,
    ServerError,
    Throttled,
    RequestTimeout,
    ClientError,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport_error",
            FailureKind::ServerError => "server_error",
            FailureKind::Throttled => "throttled",
            FailureKind::RequestTimeout => "request_timeout",
            FailureKind::ClientError => "client_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of delivering one payload to one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    pub url: String,
    /// `0` when no HTTP response was received.
    pub status_code: u16,
    pub success: bool,
    pub error_message: String,
    pub response_time: Duration,
    pub retry_count: u32,
    /// Set when the attempt was abandoned because of cancellation.
    pub cancelled: bool,
}

impl DeliveryResult {
    pub fn failure(url: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self { url: url.into(), error_message: error_message.into(), ..Default::default() }
    }

    pub fn cancelled(url: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self { cancelled: true, ..Self::failure(url, error_message) }
    }

    /// Whether a failed delivery is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        if self.success || self.cancelled {
            return false;
        }
        match self.status_code {
            0 => !self.error_message.is_empty(),
            408 | 429 => true,
            500..=599 => true,
            _ => false,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.success {
            return None;
        }
        if self.cancelled {
            return Some(FailureKind::Cancelled);
        }
        Some(match self.status_code {
            0 => FailureKind::Transport,
            408 => FailureKind::RequestTimeout,
            429 => FailureKind::Throttled,
            500..=599 => FailureKind::ServerError,
            _ => FailureKind::ClientError,
        })
    }
}
