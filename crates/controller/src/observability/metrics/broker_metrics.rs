//! # Broker Metrics
//!
//! One sample per OSBAPI request. `outcome` is the HTTP status code, or
//! `transport_error` when no response arrived.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::sync::LazyLock;

static BROKER_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "broker_controller_broker_requests_total",
            "Total number of OSBAPI requests sent to brokers",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create BROKER_REQUESTS_TOTAL metric - this should never happen")
});

static BROKER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "broker_controller_broker_request_duration_seconds",
            "Duration of OSBAPI requests in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .expect("Failed to create BROKER_REQUEST_DURATION metric - this should never happen")
});

pub(crate) fn register_broker_metrics() -> Result<()> {
    REGISTRY.register(Box::new(BROKER_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BROKER_REQUEST_DURATION.clone()))?;
    Ok(())
}

pub fn increment_broker_requests(operation: &str, outcome: &str) {
    BROKER_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn observe_broker_request_duration(operation: &str, duration: f64) {
    BROKER_REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}
