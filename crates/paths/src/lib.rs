//! Shared Open Service Broker API path definitions
//!
//! This crate centralizes all OSBAPI paths, query parameter names and headers to
//! ensure consistency between the controller's broker client and the mock broker.
//!
//! ## PathBuilder
//!
//! The `PathBuilder` provides a type-safe, builder-pattern API for constructing
//! broker request paths from instance and binding IDs.
//!
//! ## Route Constants
//!
//! Route constants are provided for Axum routes, which require static string literals.
//! These constants are validated against PathBuilder output in tests.

pub mod builder;
pub mod errors;
pub mod osbapi;

// Re-export core types for convenience
pub use builder::PathBuilder;
pub use errors::PathBuilderError;
pub use osbapi::Operation;
