//! # Controller
//!
//! - `reconciler` - Per-kind reconcilers and the entry points kube-runtime calls
//! - `backoff` - Fibonacci error backoff
//! - `server` - Metrics and probe endpoints

pub mod backoff;
pub mod reconciler;
pub mod server;
