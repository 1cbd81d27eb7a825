//! # Open Service Broker API
//!
//! Protocol client for OSBAPI v2 brokers.
//!
//! ## Sub-modules
//!
//! - `types` - Catalog, request payloads and responses
//! - `error` - Error taxonomy (Gone, Conflict, Unrecoverable, Recoverable)
//! - `client` - `BrokerClient` trait and its reqwest implementation
//! - `factory` - Builds a client for a `CFServiceBroker` from its credentials secret
//!
//! The client is stateless: each call is one HTTP request, and each response is
//! classified before it reaches a reconciler. Reconcilers never inspect raw HTTP
//! status codes.

pub mod client;
pub mod error;
pub mod factory;
pub mod types;

pub use client::{BrokerClient, BrokerConnection, HttpBrokerClient};
pub use error::{BrokerError, ErrorClass};
pub use factory::{BrokerClientFactory, ClientCreationError, HttpBrokerClientFactory};
pub use types::*;
