//! # Broker Client Factory
//!
//! Resolves a broker's Basic credentials from its secret at call time and
//! returns a ready client. Rotating the secret takes effect on the next reconcile.

use super::client::{BrokerClient, BrokerConnection, HttpBrokerClient};
use crate::crd::CFServiceBroker;
use crate::store::{SecretStore, StoreError};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;

/// Secret keys holding broker credentials
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

#[derive(Debug, Error)]
pub enum ClientCreationError {
    #[error("broker credentials secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("broker credentials secret {namespace}/{name} has no valid {key:?} key")]
    MissingKey {
        namespace: String,
        name: String,
        key: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait BrokerClientFactory: Send + Sync {
    async fn create_client(
        &self,
        broker: &CFServiceBroker,
    ) -> Result<Arc<dyn BrokerClient>, ClientCreationError>;
}

/// Factory producing [`HttpBrokerClient`]s that share one connection pool
pub struct HttpBrokerClientFactory {
    secrets: Arc<dyn SecretStore>,
    http: reqwest::Client,
    root_namespace: String,
}

impl std::fmt::Debug for HttpBrokerClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBrokerClientFactory")
            .field("root_namespace", &self.root_namespace)
            .finish_non_exhaustive()
    }
}

impl HttpBrokerClientFactory {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        http: reqwest::Client,
        root_namespace: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            http,
            root_namespace: root_namespace.into(),
        }
    }
}

#[async_trait]
impl BrokerClientFactory for HttpBrokerClientFactory {
    async fn create_client(
        &self,
        broker: &CFServiceBroker,
    ) -> Result<Arc<dyn BrokerClient>, ClientCreationError> {
        let namespace = broker
            .namespace()
            .unwrap_or_else(|| self.root_namespace.clone());
        let name = broker.spec.credentials.name.clone();

        let Some(data) = self.secrets.get(&namespace, &name).await? else {
            return Err(ClientCreationError::SecretNotFound { namespace, name });
        };

        let read = |key: &'static str| {
            data.get(key)
                .and_then(|v| String::from_utf8(v.clone()).ok())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ClientCreationError::MissingKey {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    key,
                })
        };
        let connection = BrokerConnection::new(
            broker.spec.url.clone(),
            read(USERNAME_KEY)?,
            read(PASSWORD_KEY)?,
        );

        Ok(Arc::new(HttpBrokerClient::new(
            broker.name_any(),
            connection,
            self.http.clone(),
        )))
    }
}
