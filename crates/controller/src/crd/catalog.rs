//! # CFServiceOffering / CFServicePlan
//!
//! Mirrors of a broker's catalog. Created by the broker reconciler, read by the
//! instance and binding reconcilers.

use super::LocalObjectRef;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A service sold by a broker
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFServiceOffering",
    group = "services.microscaler.io",
    version = "v1alpha1",
    namespaced,
    shortname = "cfso",
    printcolumn = r#"{"name":"Offering", "type":"string", "jsonPath":".spec.name"}, {"name":"Broker", "type":"string", "jsonPath":".spec.brokerRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceOfferingSpec {
    /// Offering name as advertised by the broker; used as the default service label
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub broker_ref: LocalObjectRef,
    pub broker_catalog: OfferingCatalog,
}

/// Broker-side identity and features of an offering
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OfferingCatalog {
    /// The broker's own service ID, echoed verbatim as `service_id`
    pub id: String,
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub plan_updateable: bool,
    #[serde(default)]
    pub instances_retrievable: bool,
    #[serde(default)]
    pub bindings_retrievable: bool,
}

/// A plan of an offering
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFServicePlan",
    group = "services.microscaler.io",
    version = "v1alpha1",
    namespaced,
    shortname = "cfsp",
    printcolumn = r#"{"name":"Plan", "type":"string", "jsonPath":".spec.name"}, {"name":"Visibility", "type":"string", "jsonPath":".spec.visibility.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFServicePlanSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub bindable: Option<bool>,
    pub offering_ref: LocalObjectRef,
    pub broker_catalog: PlanCatalog,
    /// Who may create instances of this plan
    #[serde(default)]
    pub visibility: PlanVisibility,
    /// Broker-advertised maintenance version; instances provisioned at an older
    /// version report `upgradeAvailable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanCatalog {
    /// The broker's own plan ID, echoed verbatim as `plan_id`
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityType {
    /// Only administrators; no instances may be created through this controller
    #[default]
    Admin,
    Public,
    /// Only organizations listed in `organizations`
    Organization,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanVisibility {
    pub r#type: VisibilityType,
    /// Organization GUIDs allowed when `type` is `organization`
    #[serde(default)]
    pub organizations: Vec<String>,
}

impl PlanVisibility {
    /// Whether an organization may provision this plan
    pub fn allows(&self, org_guid: &str) -> bool {
        match self.r#type {
            VisibilityType::Admin => false,
            VisibilityType::Public => true,
            VisibilityType::Organization => {
                !org_guid.is_empty() && self.organizations.iter().any(|o| o == org_guid)
            }
        }
    }
}
