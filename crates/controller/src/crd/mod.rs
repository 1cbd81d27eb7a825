//! # Custom Resource Definitions
//!
//! CRD types for the service broker controller.
//!
//! Brokers, offerings and plans live in the root namespace and describe what a
//! broker sells. Instances and bindings live in space namespaces and describe what
//! users asked for.

mod binding;
mod broker;
mod catalog;
mod instance;
mod status;

pub use binding::*;
pub use broker::*;
pub use catalog::*;
pub use instance::*;
pub use status::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by every resource kind in this crate
pub const API_GROUP: &str = "services.microscaler.io";

/// Reference to an object by name
///
/// The namespace is implied by the referencing resource: space-scoped objects
/// refer to objects in their own namespace, catalog objects to the root namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
pub struct LocalObjectRef {
    pub name: String,
}

impl LocalObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
