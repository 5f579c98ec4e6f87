//! Source-independent view of an upstream notification.
//!
//! Every upstream feed decodes into its own concrete type and exposes the
//! [`Event`] capability set. Filtering and dispatch only ever see
//! `dyn Event`, so a new feed plugs in by implementing the trait and a
//! decoder in `nmz-ingest`.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod jma;

pub use jma::{
    jma_scale_to_severity, Earthquake, Hypocenter, Issue, JmaQuake, ObservationPoint,
    JMA_QUAKE_CODE, P2PQUAKE_SOURCE,
};

/// Events travel between tasks behind an `Arc`.
pub type SharedEvent = Arc<dyn Event>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Earthquake,
    Tsunami,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Earthquake => "earthquake",
            EventType::Tsunami => "tsunami",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Event: fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    fn event_type(&self) -> EventType;

    /// Identifier of the upstream feed, e.g. `p2pquake`.
    fn source(&self) -> &str;

    /// Normalised severity in `0..=100`.
    fn severity(&self) -> u8;

    /// Prefectures touched by the event, first occurrence order, no
    /// duplicates. Empty when the event carries no observation points.
    fn affected_areas(&self) -> Vec<String>;

    fn occurred_at(&self) -> DateTime<Utc>;

    fn received_at(&self) -> DateTime<Utc>;

    /// The upstream frame exactly as it was received.
    fn raw_json(&self) -> &str;

    /// Converts a threshold expressed on this source's native scale into
    /// the normalised severity range.
    fn severity_for_scale(&self, scale: i32) -> u8;

    /// Canonical JSON body used for webhook delivery.
    fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error>;
}
