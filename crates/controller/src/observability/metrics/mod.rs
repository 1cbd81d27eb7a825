//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `controller_metrics` - Reconciliations, errors, durations and requeues per resource kind
//! - `broker_metrics` - OSBAPI requests per operation and outcome

pub mod broker_metrics;
pub mod controller_metrics;
pub mod registry;

pub use broker_metrics::*;
pub use controller_metrics::*;
pub use registry::*;
