//! Service Broker Controller Library
//!
//! Reconciles Cloud Foundry service brokers, instances and bindings against
//! Open Service Broker API brokers. Tests are included in the module files.

pub mod assets;
pub mod config;
pub mod constants;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod observability;
pub mod osbapi;
pub mod runtime;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export CRD types for convenience
pub use crd::*;
