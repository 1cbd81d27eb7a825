//! # CFServiceBinding
//!
//! Binds an app (or nothing, for service keys) to a service instance.

use super::{Condition, LastOperation, LocalObjectRef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CFServiceBinding Custom Resource Definition
///
/// The object name is the binding GUID and is sent to the broker as the OSBAPI
/// binding ID. On success two secrets are created in the binding's namespace:
/// `<name>` with the raw broker credentials and `<name>-sbio` in
/// servicebinding.io format.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFServiceBinding",
    group = "services.microscaler.io",
    version = "v1alpha1",
    namespaced,
    status = "CFServiceBindingStatus",
    shortname = "cfsbinding",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.serviceInstanceRef.name"}, {"name":"App", "type":"string", "jsonPath":".spec.appRef.name"}, {"name":"Ready", "type":"string", "jsonPath":".status.ready.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceBindingSpec {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub r#type: BindingType,
    pub service_instance_ref: LocalObjectRef,
    /// App being bound; its name is the app GUID. Absent for key bindings
    #[serde(default)]
    pub app_ref: Option<LocalObjectRef>,
    /// Secret whose `parameters` key holds a JSON object sent to the broker
    #[serde(default)]
    pub parameters_ref: Option<LocalObjectRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BindingType {
    #[default]
    App,
    Key,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CFServiceBindingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    /// Set once the broker accepted (or already had) the binding
    #[serde(default)]
    pub binding_requested: bool,
    /// Broker operation token of the pending bind, echoed on every poll.
    /// Brokers may accept a bind asynchronously without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_operation: Option<String>,
    /// Set on a 409 Conflict: the broker already holds the binding, so it is
    /// read back instead of polled
    #[serde(default)]
    pub existing_binding: bool,
    #[serde(default)]
    pub unbind_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbind_operation: Option<String>,
    /// Secret holding the raw broker credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<LocalObjectRef>,
    /// Secret holding the normalized servicebinding.io projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_secret_ref: Option<LocalObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_failed: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbinding_failed: Option<Condition>,
    #[serde(default)]
    pub deletion_requested: bool,
}

impl CFServiceBindingStatus {
    /// Both secrets have been written and recorded
    pub fn is_materialized(&self) -> bool {
        self.credentials_secret_ref.is_some() && self.binding_secret_ref.is_some()
    }

    pub fn is_binding_failed(&self) -> bool {
        super::condition_is_true(self.binding_failed.as_ref())
    }

    pub fn is_unbinding_failed(&self) -> bool {
        super::condition_is_true(self.unbinding_failed.as_ref())
    }
}

impl CFServiceBinding {
    /// Status, created empty on first access
    pub fn status_entry(&mut self) -> &mut CFServiceBindingStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
