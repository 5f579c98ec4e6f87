use lazy_static::lazy_static;
use nmz_common::metrics::NMZ_METRICS_REGISTRY;
use prometheus::{register_int_counter_with_registry, IntCounter};

lazy_static! {
    pub static ref DISPATCH_EVENTS: IntCounter = register_int_counter_with_registry!(
        "dispatcher_events_total",
        "Events taken off the ingestion channel",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    pub static ref DISPATCH_MATCHED_TARGETS: IntCounter = register_int_counter_with_registry!(
        "dispatcher_matched_targets_total",
        "Webhook targets whose filter matched an event",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();
}
