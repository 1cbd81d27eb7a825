//! OSBAPI wire types
//!
//! Field names follow the OSBAPI v2.17 JSON schema.
//! Reference: <https://github.com/openservicebrokerapi/servicebroker/blob/v2.17/spec.md>

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque JSON object (parameters, credentials)
pub type JsonObject = Map<String, Value>;

/// `GET /v2/catalog` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Catalog {
    #[serde(default)]
    pub services: Vec<CatalogService>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub instances_retrievable: bool,
    #[serde(default)]
    pub bindings_retrievable: bool,
    #[serde(default)]
    pub plan_updateable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub plans: Vec<CatalogPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CatalogPlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    /// Overrides the service-level `bindable` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_updateable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MaintenanceInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Platform context sent with provision requests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudFoundryContext {
    pub platform: &'static str,
    pub organization_guid: String,
    pub space_guid: String,
}

/// `PUT /v2/service_instances/{id}` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonObject>,
    pub context: CloudFoundryContext,
}

impl ProvisionRequest {
    pub fn new(
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        organization_guid: impl Into<String>,
        space_guid: impl Into<String>,
        parameters: Option<JsonObject>,
    ) -> Self {
        let organization_guid = organization_guid.into();
        let space_guid = space_guid.into();
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            context: CloudFoundryContext {
                platform: "cloudfoundry",
                organization_guid: organization_guid.clone(),
                space_guid: space_guid.clone(),
            },
            organization_guid,
            space_guid,
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionPayload {
    pub instance_id: String,
    pub request: ProvisionRequest,
}

/// `DELETE /v2/service_instances/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprovisionPayload {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
}

/// Last-operation poll for an instance, or for a binding when `binding_id` is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastOperationRequest {
    pub instance_id: String,
    pub binding_id: Option<String>,
    pub service_id: String,
    pub plan_id: String,
    /// Token returned by the operation being polled; omitted from the query when absent
    pub operation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindResource {
    pub app_guid: String,
}

/// `PUT /v2/service_instances/{iid}/service_bindings/{bid}` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_resource: Option<BindResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonObject>,
}

impl BindRequest {
    /// App bindings carry `app_guid` twice, key bindings carry neither
    pub fn new(
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        app_guid: Option<String>,
        parameters: Option<JsonObject>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            bind_resource: app_guid.clone().map(|app_guid| BindResource { app_guid }),
            app_guid,
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindPayload {
    pub binding_id: String,
    pub instance_id: String,
    pub request: BindRequest,
}

/// `DELETE` and `GET` of a binding share the same identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRef {
    pub binding_id: String,
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
}

/// Result of provision, deprovision and unbind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResponse {
    pub operation: Option<String>,
    /// 202 Accepted; poll `last_operation` with `operation`
    pub is_async: bool,
}

impl OperationResponse {
    pub fn is_complete(&self) -> bool {
        !self.is_async
    }
}

/// Result of bind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindResponse {
    /// Present on synchronous success; empty when `is_async`
    pub credentials: JsonObject,
    pub operation: Option<String>,
    pub is_async: bool,
}

impl BindResponse {
    pub fn is_complete(&self) -> bool {
        !self.is_async
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OperationState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

/// `GET .../last_operation` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LastOperationResponse {
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `GET /v2/service_instances/{iid}/service_bindings/{bid}` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GetBindingResponse {
    #[serde(default)]
    pub credentials: JsonObject,
}

/// Body of 200/201/202 responses to write operations
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OperationBody {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub credentials: JsonObject,
}
