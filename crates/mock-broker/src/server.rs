//! Running the broker on an ephemeral port

use crate::routes::router;
use crate::state::MockBroker;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::error;

/// A broker serving on `127.0.0.1`; stops when dropped
#[derive(Debug)]
pub struct RunningBroker {
    addr: SocketAddr,
    broker: MockBroker,
    handle: JoinHandle<()>,
}

impl RunningBroker {
    /// Base URL, e.g. `http://127.0.0.1:41234`
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[must_use]
    pub fn broker(&self) -> &MockBroker {
        &self.broker
    }
}

impl Drop for RunningBroker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `broker` on an ephemeral local port
///
/// # Errors
///
/// Returns an error if no local port can be bound.
pub async fn spawn(broker: MockBroker) -> Result<RunningBroker> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("failed to bind mock broker")?;
    let addr = listener.local_addr()?;
    let app = router(broker.clone());
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("mock broker stopped: {}", e);
        }
    });
    Ok(RunningBroker {
        addr,
        broker,
        handle,
    })
}
