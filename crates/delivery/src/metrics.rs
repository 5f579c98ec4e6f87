//! Delivery metrics
//! - every HTTP attempt, labelled by outcome
//! - the final result of each (target, event) delivery

use lazy_static::lazy_static;
use nmz_common::{metrics::NMZ_METRICS_REGISTRY, DeliveryResult};
use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Histogram, IntCounter, IntCounterVec,
};

lazy_static! {
    pub static ref DELIVERY_ATTEMPTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "delivery_attempts_total",
        "HTTP delivery attempts by outcome",
        &["outcome"],
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    pub static ref DELIVERY_RETRIES: IntCounter = register_int_counter_with_registry!(
        "delivery_retries_total",
        "Delivery attempts made after a retryable failure",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    /// Latency of a single HTTP attempt
    pub static ref DELIVERY_LATENCY: Histogram = register_histogram_with_registry!(
        "delivery_latency_seconds",
        "Webhook round-trip latency",
        NMZ_METRICS_REGISTRY
    )
    .unwrap();

    pub static ref DELIVERY_RESULTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "delivery_results_total",
        "Final delivery results by outcome",
        &["outcome"],
        NMZ_METRICS_REGISTRY
    )
    .unwrap();
}

pub fn outcome_label(result: &DeliveryResult) -> &'static str {
    result.failure_kind().map_or("success", |kind| kind.as_str())
}

pub(crate) fn record_attempt(result: &DeliveryResult) {
    DELIVERY_ATTEMPTS.with_label_values(&[outcome_label(result)]).inc();
    DELIVERY_LATENCY.observe(result.response_time.as_secs_f64());
}

pub(crate) fn record_result(result: &DeliveryResult) {
    DELIVERY_RESULTS.with_label_values(&[outcome_label(result)]).inc();
}
