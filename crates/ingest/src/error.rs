use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to connect to upstream after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: tungstenite::Error,
    },

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("failed to parse upstream message: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("ingestion client already started")]
    AlreadyStarted,
}
