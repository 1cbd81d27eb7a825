//! # Service Broker Controller
//!
//! A Kubernetes controller that provisions and binds Cloud Foundry service
//! instances through Open Service Broker API brokers.
//!
//! ## Overview
//!
//! 1. **Catalog sync** - Mirrors each `CFServiceBroker` catalog into `CFServiceOffering` and `CFServicePlan` resources
//! 2. **Managed instances** - Provisions and deprovisions `CFServiceInstance` resources, polling asynchronous operations
//! 3. **Managed bindings** - Binds and unbinds `CFServiceBinding` resources and writes their credentials secrets
//! 4. **User-provided services** - Exposes credentials from a referenced secret without a broker
//!
//! ## Features
//!
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use controller::runtime::initialization::initialize;
use controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(init_result.reconciler).await?;

    Ok(())
}
