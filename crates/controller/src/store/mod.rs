//! # Stores
//!
//! Collaborator interfaces the reconcilers depend on, injected at construction.
//!
//! - `AssetStore` - read brokers, offerings, plans, instances and space metadata
//! - `SecretStore` - read secrets and create-or-update owned secrets
//! - `CatalogWriter` - upsert offerings and plans mirrored from a broker catalog
//!
//! `kubernetes::KubeStore` implements all three against the API server.

pub mod kubernetes;

pub use kubernetes::KubeStore;

use crate::crd::{
    CFServiceBroker, CFServiceInstance, CFServiceOffering, CFServicePlan,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;
use thiserror::Error;

/// Decoded secret payload
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kubernetes api request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("{0}")]
    Other(String),
}

/// Organization and space a namespace belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceInfo {
    pub org_guid: String,
    pub space_guid: String,
}

/// A secret to create or update
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredSecret {
    pub namespace: String,
    pub name: String,
    /// Kubernetes secret type; `None` means `Opaque`
    pub secret_type: Option<String>,
    pub data: SecretData,
    pub owner: Option<OwnerReference>,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_broker(&self, namespace: &str, name: &str)
        -> Result<Option<CFServiceBroker>, StoreError>;
    async fn get_offering(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceOffering>, StoreError>;
    async fn get_plan(&self, namespace: &str, name: &str)
        -> Result<Option<CFServicePlan>, StoreError>;
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceInstance>, StoreError>;
    /// Organization and space GUIDs of a namespace, `None` if the namespace does not exist
    async fn get_space(&self, namespace: &str) -> Result<Option<SpaceInfo>, StoreError>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError>;
    async fn create_or_update(&self, secret: DesiredSecret) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn apply_offering(&self, offering: &CFServiceOffering) -> Result<(), StoreError>;
    async fn apply_plan(&self, plan: &CFServicePlan) -> Result<(), StoreError>;
}
