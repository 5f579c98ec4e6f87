use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{backoff::ExponentialBackoff, types::Subscription, validation::validate_webhook_url};

/// Environment variable holding the configuration file path
pub const CONFIG_ENV: &str = "NMZ_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config path given and NMZ_CONFIG is not set")]
    MissingPath,

    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retries after the first attempt
    #[serde(default = "default_delivery_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Upper bound on concurrent deliveries per event; unbounded when unset
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_retries: default_delivery_max_retries(),
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            max_concurrency: None,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::from_millis(self.initial_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_sender_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self { timeout_secs: default_sender_timeout_secs() }
    }
}

impl SenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_max_seen_ids")]
    pub max_seen_ids: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { max_seen_ids: default_max_seen_ids() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_events_channel_capacity")]
    pub events_channel_capacity: usize,

    /// Preemptive reconnect period, kept below the upstream's forced
    /// disconnect
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Connection attempts before giving up
    #[serde(default = "default_ingest_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_ms")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_retry_delay_ms: u64,

    /// Upper bound on one connection attempt, TCP through WebSocket upgrade
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            events_channel_capacity: default_events_channel_capacity(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            max_retries: default_ingest_max_retries(),
            initial_retry_delay_ms: default_initial_ms(),
            max_retry_delay_ms: default_max_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl IngestConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::from_millis(self.initial_retry_delay_ms, self.max_retry_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub allow_localhost: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    #[serde(default = "default_v0_max_age_secs")]
    pub v0_max_age_secs: u64,

    #[serde(default = "default_v0_future_skew_secs")]
    pub v0_future_skew_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            v0_max_age_secs: default_v0_max_age_secs(),
            v0_future_skew_secs: default_v0_future_skew_secs(),
        }
    }
}

impl SignerConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.v0_max_age_secs)
    }

    pub fn future_skew(&self) -> Duration {
        Duration::from_secs(self.v0_future_skew_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false, file_dir: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_host")]
    pub host: String,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamazuConfig {
    /// Upstream WebSocket endpoint
    pub source_endpoint: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sender: SenderConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,

    /// Static subscriptions served by the read-only repository
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

fn default_true() -> bool {
    true
}

fn default_delivery_max_retries() -> u32 {
    3
}

fn default_initial_ms() -> u64 {
    1000
}

fn default_max_ms() -> u64 {
    60_000
}

fn default_sender_timeout_secs() -> u64 {
    10
}

fn default_max_seen_ids() -> usize {
    1000
}

fn default_events_channel_capacity() -> usize {
    100
}

fn default_reconnect_interval_secs() -> u64 {
    9 * 60
}

fn default_ingest_max_retries() -> u32 {
    10
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_v0_max_age_secs() -> u64 {
    5 * 60
}

fn default_v0_future_skew_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}

impl NamazuConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = url::Url::parse(&self.source_endpoint)
            .map_err(|e| invalid(format!("source_endpoint '{}': {e}", self.source_endpoint)))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(invalid("source_endpoint must use ws:// or wss://"));
        }

        if self.retry.max_retries > 10 {
            return Err(invalid("retry.max_retries must be <= 10"));
        }
        if self.retry.initial_ms == 0 {
            return Err(invalid("retry.initial_ms must be greater than zero"));
        }
        if self.retry.max_ms < self.retry.initial_ms {
            return Err(invalid("retry.max_ms must be >= retry.initial_ms"));
        }
        if self.retry.max_concurrency == Some(0) {
            return Err(invalid("retry.max_concurrency must be greater than zero when set"));
        }

        if self.sender.timeout_secs == 0 {
            return Err(invalid("sender.timeout_secs must be greater than zero"));
        }

        if self.dedup.max_seen_ids == 0 {
            return Err(invalid("dedup.max_seen_ids must be greater than zero"));
        }

        if self.ingest.events_channel_capacity == 0 {
            return Err(invalid("ingest.events_channel_capacity must be greater than zero"));
        }
        if self.ingest.reconnect_interval_secs == 0 {
            return Err(invalid("ingest.reconnect_interval_secs must be greater than zero"));
        }
        if self.ingest.max_retries == 0 {
            return Err(invalid("ingest.max_retries must be greater than zero"));
        }
        if self.ingest.max_retry_delay_ms < self.ingest.initial_retry_delay_ms {
            return Err(invalid("ingest.max_retry_delay_ms must be >= ingest.initial_retry_delay_ms"));
        }
        if self.ingest.handshake_timeout_ms == 0 {
            return Err(invalid("ingest.handshake_timeout_ms must be greater than zero"));
        }

        if self.signer.v0_max_age_secs == 0 {
            return Err(invalid("signer.v0_max_age_secs must be greater than zero"));
        }

        let mut ids = HashSet::new();
        for subscription in &self.subscriptions {
            if !subscription.id.is_empty() && !ids.insert(subscription.id.as_str()) {
                return Err(invalid(format!("duplicate subscription id: {}", subscription.id)));
            }
            validate_webhook_url(&subscription.delivery.url, self.validator.allow_localhost)
                .map_err(|e| {
                    invalid(format!("subscription '{}': {e}", subscription_label(subscription)))
                })?;
        }

        Ok(())
    }
}

fn subscription_label(subscription: &Subscription) -> &str {
    if subscription.id.is_empty() {
        &subscription.name
    } else {
        &subscription.id
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Load and parse a configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<NamazuConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    NamazuConfig::from_toml_str(&raw)
}

/// Load the configuration file named by `NMZ_CONFIG`
pub fn load_from_env() -> Result<NamazuConfig, ConfigError> {
    let path = std::env::var_os(CONFIG_ENV).ok_or(ConfigError::MissingPath)?;
    load_config(PathBuf::from(path))
}
