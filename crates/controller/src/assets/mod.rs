//! # Catalog/Asset Resolver
//!
//! Follows an instance's or binding's references to the broker, offering and
//! plan that serve it. A broken link is reported as `NotFound`, which callers
//! treat as fatal: waiting cannot repair a dangling reference.

use crate::crd::{
    CFServiceBinding, CFServiceBroker, CFServiceInstance, CFServiceOffering, CFServicePlan,
};
use crate::store::{AssetStore, SpaceInfo, StoreError};
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} has no {reference}")]
    MissingReference {
        kind: &'static str,
        namespace: String,
        name: String,
        reference: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssetError {
    /// Dangling or absent reference, as opposed to a store failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MissingReference { .. })
    }
}

/// Catalog records serving a service instance
#[derive(Debug, Clone)]
pub struct InstanceAssets {
    pub broker: CFServiceBroker,
    pub offering: CFServiceOffering,
    pub plan: CFServicePlan,
}

/// Catalog records serving a binding, plus the bound instance
#[derive(Debug, Clone)]
pub struct BindingAssets {
    pub instance: CFServiceInstance,
    pub broker: CFServiceBroker,
    pub offering: CFServiceOffering,
    pub plan: CFServicePlan,
}

impl BindingAssets {
    /// The broker's IDs for the offering and plan
    pub fn catalog_ids(&self) -> (&str, &str) {
        (
            &self.offering.spec.broker_catalog.id,
            &self.plan.spec.broker_catalog.id,
        )
    }
}

impl InstanceAssets {
    /// The broker's IDs for the offering and plan
    pub fn catalog_ids(&self) -> (&str, &str) {
        (
            &self.offering.spec.broker_catalog.id,
            &self.plan.spec.broker_catalog.id,
        )
    }
}

/// Asset resolver over an injected store
#[derive(Clone)]
pub struct Assets {
    store: Arc<dyn AssetStore>,
    root_namespace: String,
}

impl std::fmt::Debug for Assets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assets")
            .field("root_namespace", &self.root_namespace)
            .finish_non_exhaustive()
    }
}

fn not_found(kind: &'static str, namespace: &str, name: &str) -> AssetError {
    AssetError::NotFound {
        kind,
        namespace: namespace.to_owned(),
        name: name.to_owned(),
    }
}

impl Assets {
    pub fn new(store: Arc<dyn AssetStore>, root_namespace: impl Into<String>) -> Self {
        Self {
            store,
            root_namespace: root_namespace.into(),
        }
    }

    pub fn root_namespace(&self) -> &str {
        &self.root_namespace
    }

    /// Resolve plan, offering and broker of a managed instance
    ///
    /// # Errors
    ///
    /// `NotFound`/`MissingReference` when a link is broken, `Store` when the store fails.
    pub async fn for_instance(
        &self,
        instance: &CFServiceInstance,
    ) -> Result<InstanceAssets, AssetError> {
        let namespace = instance.namespace().unwrap_or_default();
        let plan_ref = instance
            .spec
            .plan_ref
            .as_ref()
            .ok_or_else(|| AssetError::MissingReference {
                kind: "CFServiceInstance",
                namespace: namespace.clone(),
                name: instance.name_any(),
                reference: "planRef",
            })?;
        self.for_plan(&plan_ref.name).await
    }

    /// Resolve the instance of a binding and its catalog records
    ///
    /// # Errors
    ///
    /// `NotFound`/`MissingReference` when a link is broken, `Store` when the store fails.
    pub async fn for_binding(&self, binding: &CFServiceBinding) -> Result<BindingAssets, AssetError> {
        let namespace = binding.namespace().unwrap_or_default();
        let instance = self
            .instance(&namespace, &binding.spec.service_instance_ref.name)
            .await?;
        let InstanceAssets {
            broker,
            offering,
            plan,
        } = self.for_instance(&instance).await?;
        Ok(BindingAssets {
            instance,
            broker,
            offering,
            plan,
        })
    }

    /// # Errors
    ///
    /// `NotFound` if the instance does not exist.
    pub async fn instance(&self, namespace: &str, name: &str) -> Result<CFServiceInstance, AssetError> {
        self.store
            .get_instance(namespace, name)
            .await?
            .ok_or_else(|| not_found("CFServiceInstance", namespace, name))
    }

    /// # Errors
    ///
    /// `NotFound` if the namespace does not exist.
    pub async fn space(&self, namespace: &str) -> Result<SpaceInfo, AssetError> {
        self.store
            .get_space(namespace)
            .await?
            .ok_or_else(|| not_found("Namespace", "", namespace))
    }

    async fn for_plan(&self, plan_name: &str) -> Result<InstanceAssets, AssetError> {
        let ns = self.root_namespace.as_str();
        let plan = self
            .store
            .get_plan(ns, plan_name)
            .await?
            .ok_or_else(|| not_found("CFServicePlan", ns, plan_name))?;
        let offering_name = &plan.spec.offering_ref.name;
        let offering = self
            .store
            .get_offering(ns, offering_name)
            .await?
            .ok_or_else(|| not_found("CFServiceOffering", ns, offering_name))?;
        let broker_name = &offering.spec.broker_ref.name;
        let broker = self
            .store
            .get_broker(ns, broker_name)
            .await?
            .ok_or_else(|| not_found("CFServiceBroker", ns, broker_name))?;
        Ok(InstanceAssets {
            broker,
            offering,
            plan,
        })
    }
}
