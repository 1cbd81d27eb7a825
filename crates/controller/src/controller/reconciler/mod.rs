//! # Reconcilers
//!
//! One reconciler per resource kind. Each takes the resource by `&mut`, performs
//! at most one broker call, records what happened in status and returns a
//! [`ReconcileOutcome`]. The runtime persists the changes and schedules the next
//! invocation.
//!
//! ## Sub-modules
//!
//! - `instance` - Managed service instances (provision / deprovision)
//! - `binding` - Managed service bindings (bind / unbind)
//! - `user_provided` - User-provided instances and their bindings
//! - `broker` - Broker catalog mirroring
//! - `reconcile` - Entry points called by kube-runtime, timeouts and persistence
//! - `persist` - Optimistic-concurrency write-back
//! - `finalizer`, `secrets` - Helpers shared by the reconcilers

pub mod binding;
pub mod broker;
pub mod error;
pub mod finalizer;
pub mod instance;
pub mod persist;
pub mod reconcile;
pub(crate) mod secrets;
pub mod types;
pub mod user_provided;

pub use binding::ManagedBindingReconciler;
pub use broker::BrokerReconciler;
pub use error::ReconcilerError;
pub use instance::ManagedInstanceReconciler;
pub use persist::{persist, PersistOutcome};
pub use reconcile::{reconcile_binding, reconcile_broker, reconcile_instance};
pub use types::{ReconcileOutcome, Requeue};
pub use user_provided::{UserProvidedBindingReconciler, UserProvidedInstanceReconciler};

use crate::assets::Assets;
use crate::config::ControllerConfig;
use crate::constants;
use crate::controller::backoff::BackoffTable;
use crate::osbapi::{HttpBrokerClient, HttpBrokerClientFactory};
use crate::store::KubeStore;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

/// Shared context handed to every reconcile and error-policy call
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    pub assets: Assets,
    pub brokers: BrokerReconciler,
    pub instances: ManagedInstanceReconciler,
    pub user_provided_instances: UserProvidedInstanceReconciler,
    pub bindings: ManagedBindingReconciler,
    pub user_provided_bindings: UserProvidedBindingReconciler,
    pub backoffs: BackoffTable,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Wire every reconciler to the API server and one shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client's TLS backend cannot be initialized.
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self, reqwest::Error> {
        let store = Arc::new(KubeStore::new(client.clone()));
        let http = HttpBrokerClient::build_http_client(
            config.broker_request_timeout,
            config.broker_skip_tls_verify,
        )?;
        let factory = Arc::new(HttpBrokerClientFactory::new(
            store.clone(),
            http,
            config.root_namespace.clone(),
        ));
        let assets = Assets::new(store.clone(), config.root_namespace.clone());
        let missing_secret = Duration::from_secs(constants::DEFAULT_MISSING_SECRET_REQUEUE_SECS);
        let poll = config.async_poll_interval;

        Ok(Self {
            brokers: BrokerReconciler::new(factory.clone(), store.clone(), store.clone(), missing_secret),
            instances: ManagedInstanceReconciler::new(
                assets.clone(),
                factory.clone(),
                store.clone(),
                poll,
            ),
            user_provided_instances: UserProvidedInstanceReconciler::new(store.clone(), missing_secret),
            bindings: ManagedBindingReconciler::new(assets.clone(), factory, store.clone(), poll),
            user_provided_bindings: UserProvidedBindingReconciler::new(assets.clone(), store, poll),
            assets,
            client,
            backoffs: BackoffTable::new(config.backoff_min_secs, config.backoff_max_secs),
            config,
        })
    }
}
