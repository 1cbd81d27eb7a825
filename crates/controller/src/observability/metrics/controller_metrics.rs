//! # Controller Metrics
//!
//! Reconciliations, errors and requeues, labelled by resource kind or reason.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::sync::LazyLock;

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "broker_controller_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "broker_controller_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "broker_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "broker_controller_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        increment_reconciliations("test");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.with_label_values(&["test"]).get();
        increment_reconciliation_errors("test");
        let after = RECONCILIATION_ERRORS_TOTAL.with_label_values(&["test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION
            .with_label_values(&["test"])
            .get_sample_count();
        observe_reconciliation_duration("test", 1.5);
        let after = RECONCILIATION_DURATION
            .with_label_values(&["test"])
            .get_sample_count();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_requeues_are_labelled_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["ProvisionInProgress"]).get();
        increment_requeues_total("ProvisionInProgress");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["ProvisionInProgress"]).get(),
            before + 1
        );
    }
}
