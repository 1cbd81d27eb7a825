//! # Kubernetes Stores
//!
//! API-server backed implementations of the store traits.
//! Writes use server-side apply with the controller's field manager.

use super::{AssetStore, CatalogWriter, DesiredSecret, SecretData, SecretStore, SpaceInfo, StoreError};
use crate::constants::{FIELD_MANAGER, ORG_GUID_LABEL, SPACE_GUID_LABEL};
use crate::crd::{CFServiceBroker, CFServiceInstance, CFServiceOffering, CFServicePlan};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Stores backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_namespaced<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply<K>(&self, object: &K) -> Result<(), StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = object
            .namespace()
            .ok_or_else(|| StoreError::Other(format!("{} has no namespace", object.name_any())))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &object.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(object),
        )
        .await?;
        debug!(
            resource.kind = %K::kind(&()),
            resource.name = %object.name_any(),
            resource.namespace = %namespace,
            "applied"
        );
        Ok(())
    }
}

#[async_trait]
impl AssetStore for KubeStore {
    async fn get_broker(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceBroker>, StoreError> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_offering(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceOffering>, StoreError> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_plan(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServicePlan>, StoreError> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceInstance>, StoreError> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_space(&self, namespace: &str) -> Result<Option<SpaceInfo>, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.map(|ns| {
            let labels = ns.labels();
            SpaceInfo {
                org_guid: labels.get(ORG_GUID_LABEL).cloned().unwrap_or_default(),
                space_guid: labels.get(SPACE_GUID_LABEL).cloned().unwrap_or_default(),
            }
        }))
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError> {
        let secret: Option<Secret> = self.get_namespaced(namespace, name).await?;
        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, ByteString(v))| (k, v))
                .collect()
        }))
    }

    async fn create_or_update(&self, desired: DesiredSecret) -> Result<(), StoreError> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(desired.name),
                namespace: Some(desired.namespace),
                owner_references: desired.owner.map(|o| vec![o]),
                ..ObjectMeta::default()
            },
            type_: desired.secret_type,
            data: Some(
                desired
                    .data
                    .into_iter()
                    .map(|(k, v)| (k, ByteString(v)))
                    .collect(),
            ),
            ..Secret::default()
        };
        self.apply(&secret).await
    }
}

#[async_trait]
impl CatalogWriter for KubeStore {
    async fn apply_offering(&self, offering: &CFServiceOffering) -> Result<(), StoreError> {
        self.apply(offering).await
    }

    async fn apply_plan(&self, plan: &CFServicePlan) -> Result<(), StoreError> {
        self.apply(plan).await
    }
}
