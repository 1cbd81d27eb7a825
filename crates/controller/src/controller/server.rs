//! # HTTP Server
//!
//! Serves Prometheus metrics and Kubernetes probes.
//!
//! - `/metrics` - Prometheus text format
//! - `/healthz` - Liveness, always OK once the process serves requests
//! - `/readyz` - Readiness, OK once the listener is bound

use crate::observability::metrics;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared server state
#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process exits
///
/// Marks the state ready once the listener is bound.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server stops.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind metrics port {port}"))?;
    info!(port, "HTTP server listening");
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn readyz(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn readyz_reflects_state() {
        let state = Arc::new(ServerState::default());
        let response = router(state.clone())
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.is_ready.store(true, Ordering::Relaxed);
        let response = router(state)
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_are_served() {
        metrics::increment_reconciliations("CFServiceBroker");
        let response = router(Arc::new(ServerState::default()))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
