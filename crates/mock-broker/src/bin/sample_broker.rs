//! Sample OSBAPI Broker
//!
//! Serves the sample catalog for local development against a real cluster.
//!
//! Environment Variables:
//! - PORT: Port to listen on (default: 8080)
//! - BROKER_USERNAME: Basic auth username (default: broker)
//! - BROKER_PASSWORD: Basic auth password (default: broker-password)

use anyhow::{Context, Result};
use mock_broker::{router, MockBroker, DEFAULT_PASSWORD, DEFAULT_USERNAME};
use std::env;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let port = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_owned())
        .parse::<u16>()
        .context("PORT must be a valid u16")?;
    let username = env::var("BROKER_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_owned());
    let password = env::var("BROKER_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_owned());

    info!("Starting sample OSBAPI broker...");
    info!("Username: {}", username);

    let app = router(MockBroker::new(username, password));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Sample broker ready at http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
