//! Scriptable Open Service Broker API mock broker
//!
//! Serves the OSBAPI v2 routes from the `paths` crate against an in-memory
//! store of instances and bindings. By default it behaves like a small real
//! broker:
//!
//! - `GET /v2/catalog` returns [`catalog::sample_catalog`]
//! - Provision and deprovision are asynchronous when `accepts_incomplete=true`
//!   and complete on the second `last_operation` poll
//! - Bind is synchronous and returns credentials
//! - Requests without valid Basic credentials get `401`
//!
//! Tests can queue a scripted status and body per [`Operation`]; a queued
//! response is returned once, before the default behavior. Every request is
//! recorded with its path, query, API version header and body.

pub mod catalog;
pub mod errors;
pub mod routes;
pub mod server;
pub mod state;

pub use paths::Operation;
pub use routes::router;
pub use server::{spawn, RunningBroker};
pub use state::{MockBroker, RecordedRequest, ScriptedResponse};

/// Credentials the sample broker accepts unless configured otherwise
pub const DEFAULT_USERNAME: &str = "broker";
pub const DEFAULT_PASSWORD: &str = "broker-password";
