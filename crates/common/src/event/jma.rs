use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{Event, EventType};

/// Message code of a JMA earthquake report on the P2P earthquake feed.
pub const JMA_QUAKE_CODE: i32 = 551;

pub const P2PQUAKE_SOURCE: &str = "p2pquake";

/// Upstream timestamps are JST wall-clock strings.
const JST_OFFSET_SECS: i32 = 9 * 60 * 60;
const UPSTREAM_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// Maps the JMA seismic intensity code to the normalised severity range.
pub fn jma_scale_to_severity(scale: i32) -> u8 {
    match scale {
        10 => 10,
        20 => 20,
        30 => 30,
        40 => 40,
        45 => 50,
        50 => 60,
        55 => 70,
        60 => 80,
        70 => 100,
        _ => 0,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub correct: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hypocenter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub depth: f64,
    #[serde(default)]
    pub magnitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Earthquake {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub hypocenter: Hypocenter,
    #[serde(default, rename = "maxScale")]
    pub max_scale: i32,
    #[serde(default, rename = "domesticTsunami")]
    pub domestic_tsunami: String,
    #[serde(default, rename = "foreignTsunami", skip_serializing_if = "Option::is_none")]
    pub foreign_tsunami: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint {
    #[serde(default)]
    pub pref: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub scale: i32,
    #[serde(default, rename = "isArea")]
    pub is_area: bool,
}

/// JMA earthquake report (code 551).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JmaQuake {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: i32,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub issue: Issue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earthquake: Option<Earthquake>,
    #[serde(default)]
    pub points: Vec<ObservationPoint>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    #[serde(skip)]
    pub raw_json: String,
}

impl JmaQuake {
    /// Decodes a full code-551 frame and stamps it with the receive time.
    pub fn from_frame(text: &str, received_at: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let mut quake: JmaQuake = serde_json::from_str(text)?;
        quake.received_at = received_at;
        quake.raw_json = text.to_string();
        Ok(quake)
    }

    pub fn max_scale(&self) -> Option<i32> {
        self.earthquake.as_ref().map(|eq| eq.max_scale)
    }
}

fn parse_upstream_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), UPSTREAM_TIME_FORMAT).ok()?;
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
    jst.from_local_datetime(&naive).single().map(|dt| dt.with_timezone(&Utc))
}

impl Event for JmaQuake {
    fn id(&self) -> &str {
        &self.id
    }

    fn event_type(&self) -> EventType {
        EventType::Earthquake
    }

    fn source(&self) -> &str {
        P2PQUAKE_SOURCE
    }

    fn severity(&self) -> u8 {
        self.max_scale().map_or(0, jma_scale_to_severity)
    }

    fn affected_areas(&self) -> Vec<String> {
        let mut areas: Vec<String> = Vec::with_capacity(self.points.len());
        for point in &self.points {
            if !areas.iter().any(|seen| seen == &point.pref) {
                areas.push(point.pref.clone());
            }
        }
        areas
    }

    // Falls back to the receive time when the upstream timestamp is malformed.
    fn occurred_at(&self) -> DateTime<Utc> {
        parse_upstream_time(&self.time).unwrap_or(self.received_at)
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    fn raw_json(&self) -> &str {
        &self.raw_json
    }

    fn severity_for_scale(&self, scale: i32) -> u8 {
        jma_scale_to_severity(scale)
    }

    fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
