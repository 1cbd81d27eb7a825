//! # CFServiceInstance
//!
//! A service instance requested by a user. Managed instances are provisioned by
//! a broker; user-provided instances carry their credentials in a secret.

use super::{Condition, LastOperation, LocalObjectRef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CFServiceInstance Custom Resource Definition
///
/// The object name is the instance GUID and is sent to the broker as the
/// OSBAPI instance ID.
///
/// # Example
///
/// ```yaml
/// apiVersion: services.microscaler.io/v1alpha1
/// kind: CFServiceInstance
/// metadata:
///   name: 6f3a1c52-0a1e-4d41-9d9e-0a4b3f7c2b10
///   namespace: cf-space-dev
/// spec:
///   displayName: my-db
///   type: managed
///   planRef:
///     name: 9c2f1d0e-5b7a-5a3e-8f0d-1f9a6c4e2b33
///   parametersRef:
///     name: my-db-parameters
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFServiceInstance",
    group = "services.microscaler.io",
    version = "v1alpha1",
    namespaced,
    status = "CFServiceInstanceStatus",
    shortname = "cfsi",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}, {"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Ready", "type":"string", "jsonPath":".status.ready.status"}, {"name":"Last Operation", "type":"string", "jsonPath":".status.lastOperation.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceInstanceSpec {
    #[serde(default)]
    pub display_name: Option<String>,
    /// Which reconciler owns this instance
    #[serde(rename = "type")]
    pub kind: InstanceKind,
    /// Plan to provision (managed instances only)
    #[serde(default)]
    pub plan_ref: Option<LocalObjectRef>,
    /// Service label exposed to apps; defaults to the offering name on first
    /// reconcile and is never overwritten afterwards
    #[serde(default)]
    pub service_label: Option<String>,
    /// Secret whose `parameters` key holds a JSON object sent to the broker
    #[serde(default)]
    pub parameters_ref: Option<LocalObjectRef>,
    /// Secret whose `credentials` key holds a JSON object (user-provided instances only)
    #[serde(default)]
    pub credentials_ref: Option<LocalObjectRef>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Instance kinds, routed to distinct reconcilers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum InstanceKind {
    #[serde(rename = "managed")]
    Managed,
    #[serde(rename = "user-provided")]
    UserProvided,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceInstanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    /// Set once a provision request was accepted asynchronously
    #[serde(default)]
    pub provision_requested: bool,
    /// Broker operation token of the pending provision, echoed on every poll
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_operation: Option<String>,
    /// Set once a deprovision request was accepted asynchronously
    #[serde(default)]
    pub deprovision_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprovision_operation: Option<String>,
    /// Plan maintenance version the instance was provisioned at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info_version: Option<String>,
    #[serde(default)]
    pub upgrade_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_failed: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprovisioning_failed: Option<Condition>,
    /// Set once the controller has observed the deletion request
    #[serde(default)]
    pub deletion_requested: bool,
}

impl CFServiceInstanceStatus {
    pub fn is_ready(&self) -> bool {
        super::condition_is_true(self.ready.as_ref())
    }

    pub fn is_provisioning_failed(&self) -> bool {
        super::condition_is_true(self.provisioning_failed.as_ref())
    }

    pub fn is_deprovisioning_failed(&self) -> bool {
        super::condition_is_true(self.deprovisioning_failed.as_ref())
    }
}

impl CFServiceInstance {
    /// Status, created empty on first access
    pub fn status_entry(&mut self) -> &mut CFServiceInstanceStatus {
        self.status.get_or_insert_with(Default::default)
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(CFServiceInstanceStatus::is_ready)
    }
}
