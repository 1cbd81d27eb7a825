//! # CFServiceBroker
//!
//! A registered OSBAPI broker.

use super::{Condition, LocalObjectRef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CFServiceBroker Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: services.microscaler.io/v1alpha1
/// kind: CFServiceBroker
/// metadata:
///   name: 0b6a2d1e-9e55-4c43-8a5c-4b6e3b8b5f51
///   namespace: cf
/// spec:
///   name: sample-broker
///   url: https://sample-broker.example.com
///   credentials:
///     name: sample-broker-credentials
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFServiceBroker",
    group = "services.microscaler.io",
    version = "v1alpha1",
    namespaced,
    status = "CFServiceBrokerStatus",
    shortname = "cfsb",
    printcolumn = r#"{"name":"Name", "type":"string", "jsonPath":".spec.name"}, {"name":"URL", "type":"string", "jsonPath":".spec.url"}, {"name":"Ready", "type":"string", "jsonPath":".status.ready.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceBrokerSpec {
    /// Human-readable broker name
    pub name: String,
    /// Base URL of the broker, e.g. `https://broker.example.com`
    /// Request paths (`/v2/...`) are appended to it
    pub url: String,
    /// Secret in the same namespace holding `username` and `password` keys
    /// Read on every reconcile, so rotating it takes effect without a restart
    pub credentials: LocalObjectRef,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceBrokerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// True once the catalog has been fetched and mirrored into offerings and plans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    /// Number of offerings in the last fetched catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offerings: Option<u32>,
    /// Number of plans in the last fetched catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plans: Option<u32>,
    /// RFC3339 time of the last successful catalog fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_catalog_sync_time: Option<String>,
}

impl CFServiceBroker {
    pub fn status_entry(&mut self) -> &mut CFServiceBrokerStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
