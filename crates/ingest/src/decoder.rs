use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use nmz_common::{
    event::{JmaQuake, JMA_QUAKE_CODE},
    SharedEvent,
};
use serde::Deserialize;

use crate::{dedup::Deduplicator, error::IngestError};

/// Fields every upstream frame carries
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "_id")]
    id: String,
    code: i32,
}

/// Turns a text frame with a supported `code` into an event.
pub trait EventDecoder: Send + Sync + 'static {
    fn accepts(&self, code: i32) -> bool;

    fn decode(&self, text: &str, received_at: DateTime<Utc>) -> Result<SharedEvent, IngestError>;
}

/// P2P earthquake feed, JMA earthquake information only.
#[derive(Debug, Clone, Copy, Default)]
pub struct P2pQuakeDecoder;

impl EventDecoder for P2pQuakeDecoder {
    fn accepts(&self, code: i32) -> bool {
        code == JMA_QUAKE_CODE
    }

    fn decode(&self, text: &str, received_at: DateTime<Utc>) -> Result<SharedEvent, IngestError> {
        Ok(Arc::new(JmaQuake::from_frame(text, received_at)?))
    }
}

/// Why a frame did not produce an event
#[derive(Debug)]
pub enum Discard {
    MalformedEnvelope(serde_json::Error),
    UnsupportedCode(i32),
    Duplicate(String),
    Malformed { id: String, error: IngestError },
}

impl Discard {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            Discard::MalformedEnvelope(_) | Discard::Malformed { .. } => "parse_error",
            Discard::UnsupportedCode(_) => "unsupported_code",
            Discard::Duplicate(_) => "duplicate",
        }
    }
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::MalformedEnvelope(e) => write!(f, "malformed envelope: {e}"),
            Discard::UnsupportedCode(code) => write!(f, "unsupported code {code}"),
            Discard::Duplicate(id) => write!(f, "duplicate event {id}"),
            Discard::Malformed { id, error } => write!(f, "malformed event {id}: {error}"),
        }
    }
}

/// Envelope, code, dedup, then the full decode. An ID is remembered as
/// soon as the code is accepted, so a frame that fails the full decode is
/// not retried when the upstream repeats it.
pub fn decode_frame(
    text: &str,
    received_at: DateTime<Utc>,
    dedup: &Deduplicator,
    decoder: &dyn EventDecoder,
) -> Result<SharedEvent, Discard> {
    let envelope: Envelope = serde_json::from_str(text).map_err(Discard::MalformedEnvelope)?;

    if !decoder.accepts(envelope.code) {
        return Err(Discard::UnsupportedCode(envelope.code));
    }

    if dedup.is_duplicate(&envelope.id) {
        return Err(Discard::Duplicate(envelope.id));
    }

    decoder
        .decode(text, received_at)
        .map_err(|error| Discard::Malformed { id: envelope.id, error })
}
