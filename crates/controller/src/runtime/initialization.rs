//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{load_config, ServerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::{CFServiceBroker, CFServiceInstance};
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
#[allow(missing_debug_implementations, reason = "kube::Client is not Debug")]
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context shared by every controller
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
///
/// # Errors
///
/// Returns an error if any of the above fails.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow!("failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "controller=info".into()),
        )
        .init();

    info!(
        "Starting Service Broker Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (controller_config, server_config) = load_config();
    info!(
        root_namespace = %controller_config.root_namespace,
        reconcile_timeout = ?controller_config.reconcile_timeout,
        async_poll_interval = ?controller_config.async_poll_interval,
        "Loaded configuration"
    );
    if controller_config.broker_skip_tls_verify {
        warn!("Broker TLS certificate verification is disabled");
    }

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_state_clone = server_state.clone();
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    check_resources_queryable(&client, &controller_config.root_namespace).await;

    let reconciler = Arc::new(
        Reconciler::new(client.clone(), controller_config)
            .context("failed to build broker HTTP client")?,
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a startup summary, or point at missing CRDs
///
/// Existing resources are reconciled by the controllers' initial list.
async fn check_resources_queryable(client: &Client, root_namespace: &str) {
    let startup_span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.check_resources",
        root_namespace = root_namespace
    );
    let _guard = startup_span.enter();

    let brokers: Api<CFServiceBroker> = Api::namespaced(client.clone(), root_namespace);
    let instances: Api<CFServiceInstance> = Api::all(client.clone());

    match (
        brokers.list(&ListParams::default()).await,
        instances.list(&ListParams::default()).await,
    ) {
        (Ok(brokers), Ok(instances)) => {
            info!(
                "CRDs are queryable: {} brokers in {}, {} service instances cluster-wide",
                brokers.items.len(),
                root_namespace,
                instances.items.len()
            );
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("CRDs are not queryable; {:?}. Are the CRDs installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controllers will retry");
        }
    }
}
