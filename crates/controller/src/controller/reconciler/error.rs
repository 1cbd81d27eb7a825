//! # Reconciler Errors
//!
//! Failures that abort a reconcile and are retried with backoff by the error
//! policy. Terminal conditions are not errors: they are recorded in status and
//! returned as [`super::ReconcileOutcome::NotReady`] with `Requeue::Never`.

use crate::assets::AssetError;
use crate::credentials::CredentialsError;
use crate::osbapi::{BrokerError, ClientCreationError};
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("failed to create broker client: {0}")]
    ClientCreation(#[from] ClientCreationError),
    #[error("failed to resolve assets: {0}")]
    Assets(#[from] AssetError),
    #[error("store request failed: {0}")]
    Store(#[from] StoreError),
    #[error("invalid secret contents: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("failed to persist {kind} {namespace}/{name}: {source}")]
    Persist {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

impl ReconcilerError {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broker(_) => "broker",
            Self::ClientCreation(_) => "client_creation",
            Self::Assets(_) => "assets",
            Self::Store(_) => "store",
            Self::Credentials(_) => "credentials",
            Self::SecretNotFound { .. } => "secret_not_found",
            Self::Persist { .. } => "persist",
            Self::Timeout(_) => "timeout",
        }
    }
}
