//! Ingestion metrics
//! - frames read from the upstream and what became of them
//! - connection state and reconnects

use lazy_static::lazy_static;
use nmz_common::metrics::NMZ_METRICS_REGISTRY;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    pub static ref INGEST_MESSAGES_RECEIVED: IntCounter = register_int_counter_with_registry!(
        "ingest_messages_received_total",
        "Text frames read from the upstream feed",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    pub static ref INGEST_EVENTS_PUBLISHED: IntCounter = register_int_counter_with_registry!(
        "ingest_events_published_total",
        "Events handed to the dispatcher",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    /// Reasons: duplicate, unsupported_code, parse_error, channel_full
    pub static ref INGEST_EVENTS_DROPPED: IntCounterVec = register_int_counter_vec_with_registry!(
        "ingest_events_dropped_total",
        "Frames discarded before reaching the dispatcher",
        &["reason"],
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    /// Causes: read_error, scheduled
    pub static ref INGEST_RECONNECTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "ingest_reconnects_total",
        "Upstream reconnects by cause",
        &["cause"],
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    pub static ref INGEST_CONNECTED: IntGauge = register_int_gauge_with_registry!(
        "ingest_connected",
        "1 while an upstream connection is open",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();
}
