//! Secret reads and writes shared by the reconcilers.

use super::ReconcilerError;
use crate::constants::BINDING_SECRET_SUFFIX;
use crate::credentials;
use crate::crd::{
    set_condition, CFServiceBinding, Condition, ConditionStatus, LocalObjectRef,
};
use crate::osbapi::JsonObject;
use crate::store::{DesiredSecret, SecretStore};
use kube::{Resource, ResourceExt};
use tracing::info;

/// Load the JSON object stored under `parameters` in the referenced secret
///
/// A missing secret is recoverable (`SecretNotFound`); it may be created after
/// the resource. Bad contents are `Credentials` and fatal.
pub(crate) async fn load_parameters(
    secrets: &dyn SecretStore,
    namespace: &str,
    parameters_ref: Option<&LocalObjectRef>,
) -> Result<Option<JsonObject>, ReconcilerError> {
    let Some(parameters_ref) = parameters_ref else {
        return Ok(None);
    };
    let data = secrets
        .get(namespace, &parameters_ref.name)
        .await?
        .ok_or_else(|| ReconcilerError::SecretNotFound {
            namespace: namespace.to_owned(),
            name: parameters_ref.name.clone(),
        })?;
    Ok(Some(credentials::get_parameters(&data)?))
}

/// Write both binding secrets and record them in status
///
/// The raw secret is named after the binding; the normalized servicebinding.io
/// secret is derived from the raw secret's payload. Both are owned by the
/// binding. Safe to repeat: the same credentials produce the same secrets.
pub(crate) async fn materialize_binding_secrets(
    secrets: &dyn SecretStore,
    binding: &mut CFServiceBinding,
    credentials: &JsonObject,
) -> Result<(), ReconcilerError> {
    let namespace = binding.namespace().unwrap_or_default();
    let name = binding.name_any();
    let owner = binding.controller_owner_ref(&());

    let raw = credentials::to_credentials_secret_data(credentials);
    let parsed = credentials::get_credentials(&raw)?;
    secrets
        .create_or_update(DesiredSecret {
            namespace: namespace.clone(),
            name: name.clone(),
            secret_type: None,
            data: raw,
            owner: owner.clone(),
        })
        .await?;

    let binding_secret_name = format!("{name}{BINDING_SECRET_SUFFIX}");
    secrets
        .create_or_update(DesiredSecret {
            namespace: namespace.clone(),
            name: binding_secret_name.clone(),
            secret_type: Some(credentials::binding_secret_type(&parsed)),
            data: credentials::to_normalized_secret_data(&parsed),
            owner,
        })
        .await?;

    let generation = binding.metadata.generation;
    let status = binding.status_entry();
    status.credentials_secret_ref = Some(LocalObjectRef::new(name.clone()));
    status.binding_secret_ref = Some(LocalObjectRef::new(binding_secret_name));
    set_condition(
        &mut status.ready,
        Condition::new(ConditionStatus::True, "SecretsMaterialized", None, generation),
    );
    info!(
        binding.name = %name,
        binding.namespace = %namespace,
        "binding secrets materialized"
    );
    Ok(())
}
