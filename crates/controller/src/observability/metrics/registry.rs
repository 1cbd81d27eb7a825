//! # Metrics Registry
//!
//! Prometheus metrics registry setup and registration.

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register all metrics with the Prometheus registry
///
/// Registry::register() takes ownership, so the metrics are cloned. Prometheus
/// metrics are Arc-backed, so clones share their values.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    super::controller_metrics::register_controller_metrics()?;
    super::broker_metrics::register_broker_metrics()?;
    Ok(())
}

/// Render every registered metric in the Prometheus text format
///
/// # Errors
///
/// Encoding failures, which only occur on invalid metric families.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
