//! # Managed Binding Reconciler
//!
//! Binds a `CFServiceBinding` through the broker of its (managed) instance and
//! materializes the returned credentials as two secrets.
//!
//! ```text
//! NotStarted -> WaitingForInstance -> Binding(initial | in progress) -> Bound | BindingFailed
//! Bound | BindingFailed -> Unbinding(initial | in progress) -> Removed
//! ```
//!
//! A 409 on bind means the broker already holds the binding: the next step
//! reads it back instead of polling.
//!
//! Deletion always calls unbind, even with no bind on record; a 410 finalizes.

use super::finalizer::{add_finalizer, has_finalizer, is_deleting, purge_requested, remove_finalizer};
use super::secrets::{load_parameters, materialize_binding_secrets};
use super::{ReconcileOutcome, ReconcilerError};
use crate::assets::{AssetError, Assets, BindingAssets};
use crate::constants::MANAGED_BINDING_FINALIZER;
use crate::crd::{
    begin_operation, set_condition, CFServiceBinding, Condition, ConditionStatus,
    LastOperationState, LastOperationType,
};
use crate::osbapi::{
    BindPayload, BindRequest, BindingRef, BrokerClient, BrokerClientFactory,
    LastOperationRequest, OperationState,
};
use crate::store::SecretStore;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ManagedBindingReconciler {
    assets: Assets,
    clients: Arc<dyn BrokerClientFactory>,
    secrets: Arc<dyn SecretStore>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ManagedBindingReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedBindingReconciler")
            .field("assets", &self.assets)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

fn binding_ref(binding: &CFServiceBinding, assets: &BindingAssets) -> BindingRef {
    let (service_id, plan_id) = assets.catalog_ids();
    BindingRef {
        binding_id: binding.name_any(),
        instance_id: assets.instance.name_any(),
        service_id: service_id.to_owned(),
        plan_id: plan_id.to_owned(),
    }
}

impl ManagedBindingReconciler {
    pub fn new(
        assets: Assets,
        clients: Arc<dyn BrokerClientFactory>,
        secrets: Arc<dyn SecretStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            assets,
            clients,
            secrets,
            poll_interval,
        }
    }

    /// Advance the binding one step
    ///
    /// # Errors
    ///
    /// Recoverable failures; the binding's conditions are left untouched.
    pub async fn reconcile(
        &self,
        binding: &mut CFServiceBinding,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = binding.metadata.generation;
        binding.status_entry().observed_generation = generation;

        if is_deleting(binding) {
            return self.finalize(binding).await;
        }

        add_finalizer(binding, MANAGED_BINDING_FINALIZER);

        if binding.status_entry().is_materialized() {
            return Ok(ReconcileOutcome::Done);
        }
        if binding.status_entry().is_binding_failed() {
            return Ok(ReconcileOutcome::no_requeue("BindingFailed", None));
        }

        let assets = match self.assets.for_binding(binding).await {
            Ok(assets) => assets,
            Err(e) if e.is_not_found() => {
                let message = e.to_string();
                warn!(binding = %binding.name_any(), error = %message, "assets not found");
                set_condition(
                    &mut binding.status_entry().ready,
                    Condition::new(
                        ConditionStatus::False,
                        "AssetsNotFound",
                        Some(message.clone()),
                        generation,
                    ),
                );
                return Ok(ReconcileOutcome::no_requeue("AssetsNotFound", Some(message)));
            }
            Err(e) => return Err(e.into()),
        };

        if !assets.instance.is_ready() {
            debug!(
                binding = %binding.name_any(),
                instance = %assets.instance.name_any(),
                "waiting for service instance to become ready"
            );
            set_condition(
                &mut binding.status_entry().ready,
                Condition::new(
                    ConditionStatus::False,
                    "ServiceInstanceNotReady",
                    None,
                    generation,
                ),
            );
            return Ok(ReconcileOutcome::requeue_after(
                "ServiceInstanceNotReady",
                self.poll_interval,
            ));
        }

        let client = self.clients.create_client(&assets.broker).await?;

        if binding.status_entry().existing_binding {
            return self.fetch_binding(binding, &assets, client.as_ref()).await;
        }
        if binding.status_entry().binding_requested {
            return self.poll_bind(binding, &assets, client.as_ref()).await;
        }

        let namespace = binding.namespace().unwrap_or_default();
        let parameters = match load_parameters(
            self.secrets.as_ref(),
            &namespace,
            binding.spec.parameters_ref.as_ref(),
        )
        .await
        {
            Ok(parameters) => parameters,
            Err(ReconcilerError::Credentials(e)) => {
                let message = format!("invalid parameters: {e}");
                set_condition(
                    &mut binding.status_entry().ready,
                    Condition::new(
                        ConditionStatus::False,
                        "InvalidParameters",
                        Some(message.clone()),
                        generation,
                    ),
                );
                return Ok(ReconcileOutcome::no_requeue("InvalidParameters", Some(message)));
            }
            Err(e) => return Err(e),
        };

        let (service_id, plan_id) = assets.catalog_ids();
        let payload = BindPayload {
            binding_id: binding.name_any(),
            instance_id: assets.instance.name_any(),
            request: BindRequest::new(
                service_id,
                plan_id,
                binding.spec.app_ref.as_ref().map(|app| app.name.clone()),
                parameters,
            ),
        };
        self.bind(binding, &payload, client.as_ref()).await
    }

    async fn bind(
        &self,
        binding: &mut CFServiceBinding,
        payload: &BindPayload,
        client: &dyn BrokerClient,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        begin_operation(&mut binding.status_entry().last_operation, LastOperationType::Create);

        match client.bind(payload).await {
            Ok(response) if response.is_complete() => {
                materialize_binding_secrets(self.secrets.as_ref(), binding, &response.credentials)
                    .await?;
                advance(binding, LastOperationState::Succeeded, None);
                Ok(ReconcileOutcome::Done)
            }
            Ok(response) => {
                info!(
                    binding = %payload.binding_id,
                    operation = response.operation.as_deref().unwrap_or_default(),
                    "bind accepted, polling last operation"
                );
                let status = binding.status_entry();
                status.binding_requested = true;
                status.binding_operation = response.operation;
                advance(binding, LastOperationState::InProgress, None);
                Ok(ReconcileOutcome::requeue_after(
                    "BindingRequested",
                    self.poll_interval,
                ))
            }
            Err(e) if e.is_conflict() => {
                // Existing binding parameters are not compared with this request.
                warn!(
                    binding = %payload.binding_id,
                    "broker reports binding already exists, reading it back"
                );
                let status = binding.status_entry();
                status.existing_binding = true;
                status.binding_operation = None;
                Ok(ReconcileOutcome::requeue_now("BindingRequested"))
            }
            Err(e) if e.is_unrecoverable() => Ok(fail_binding(binding, e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn poll_bind(
        &self,
        binding: &mut CFServiceBinding,
        assets: &BindingAssets,
        client: &dyn BrokerClient,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let target = binding_ref(binding, assets);
        let request = LastOperationRequest {
            instance_id: target.instance_id.clone(),
            binding_id: Some(target.binding_id.clone()),
            service_id: target.service_id.clone(),
            plan_id: target.plan_id.clone(),
            operation: binding.status_entry().binding_operation.clone(),
        };
        match client.get_last_operation(&request).await {
            Ok(last) => match last.state {
                OperationState::InProgress => {
                    advance(binding, LastOperationState::InProgress, last.description);
                    Ok(ReconcileOutcome::requeue_after(
                        "BindingInProgress",
                        self.poll_interval,
                    ))
                }
                OperationState::Succeeded => self.fetch_binding(binding, assets, client).await,
                OperationState::Failed => Ok(fail_binding(
                    binding,
                    last.description.unwrap_or_else(|| "bind failed".to_owned()),
                )),
            },
            Err(e) if e.is_gone() || e.is_unrecoverable() => {
                Ok(fail_binding(binding, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_binding(
        &self,
        binding: &mut CFServiceBinding,
        assets: &BindingAssets,
        client: &dyn BrokerClient,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let target = binding_ref(binding, assets);
        match client.get_binding(&target).await {
            Ok(response) => {
                materialize_binding_secrets(self.secrets.as_ref(), binding, &response.credentials)
                    .await?;
                advance(binding, LastOperationState::Succeeded, None);
                Ok(ReconcileOutcome::Done)
            }
            Err(e) if e.is_gone() || e.is_unrecoverable() => {
                Ok(fail_binding(binding, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn finalize(
        &self,
        binding: &mut CFServiceBinding,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !has_finalizer(binding, MANAGED_BINDING_FINALIZER) {
            return Ok(ReconcileOutcome::Done);
        }
        binding.status_entry().deletion_requested = true;

        if purge_requested(binding) {
            warn!(binding = %binding.name_any(), "purge requested, removing finalizer without unbinding");
            remove_finalizer(binding, MANAGED_BINDING_FINALIZER);
            return Ok(ReconcileOutcome::Done);
        }

        if binding.status_entry().is_unbinding_failed() {
            return Ok(ReconcileOutcome::no_requeue("UnbindingFailed", None));
        }

        let assets = match self.assets.for_binding(binding).await {
            Ok(assets) => assets,
            Err(AssetError::NotFound {
                kind: "CFServiceInstance",
                ..
            }) => {
                info!(binding = %binding.name_any(), "service instance is gone, so is the binding");
                return Ok(finalized(binding));
            }
            Err(e) if e.is_not_found() => {
                return Ok(fail_unbinding(binding, "AssetsNotFound", e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let client = self.clients.create_client(&assets.broker).await?;
        let target = binding_ref(binding, &assets);

        if binding.status_entry().unbind_requested {
            let request = LastOperationRequest {
                instance_id: target.instance_id.clone(),
                binding_id: Some(target.binding_id.clone()),
                service_id: target.service_id.clone(),
                plan_id: target.plan_id.clone(),
                operation: binding.status_entry().unbind_operation.clone(),
            };
            return match client.get_last_operation(&request).await {
                Ok(last) => match last.state {
                    OperationState::InProgress => {
                        advance(binding, LastOperationState::InProgress, last.description);
                        Ok(ReconcileOutcome::requeue_after(
                            "UnbindInProgress",
                            self.poll_interval,
                        ))
                    }
                    OperationState::Succeeded => Ok(finalized(binding)),
                    OperationState::Failed => Ok(fail_unbinding(
                        binding,
                        "UnbindFailed",
                        last.description.unwrap_or_else(|| "unbind failed".to_owned()),
                    )),
                },
                Err(e) if e.is_gone() => Ok(finalized(binding)),
                Err(e) if e.is_unrecoverable() => {
                    Ok(fail_unbinding(binding, "UnbindFailed", e.to_string()))
                }
                Err(e) => Err(e.into()),
            };
        }

        begin_operation(&mut binding.status_entry().last_operation, LastOperationType::Delete);
        match client.unbind(&target).await {
            Ok(response) if response.is_complete() => Ok(finalized(binding)),
            Ok(response) => {
                let status = binding.status_entry();
                status.unbind_requested = true;
                status.unbind_operation = response.operation;
                advance(binding, LastOperationState::InProgress, None);
                Ok(ReconcileOutcome::requeue_after(
                    "UnbindRequested",
                    self.poll_interval,
                ))
            }
            Err(e) if e.is_gone() => Ok(finalized(binding)),
            Err(e) if e.is_unrecoverable() => {
                Ok(fail_unbinding(binding, "UnbindFailed", e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn advance(binding: &mut CFServiceBinding, state: LastOperationState, description: Option<String>) {
    if let Some(op) = binding.status_entry().last_operation.as_mut() {
        op.advance(state, description);
    }
}

fn fail_binding(binding: &mut CFServiceBinding, message: String) -> ReconcileOutcome {
    warn!(binding = %binding.name_any(), error = %message, "binding failed");
    let generation = binding.metadata.generation;
    advance(binding, LastOperationState::Failed, Some(message.clone()));
    let status = binding.status_entry();
    set_condition(
        &mut status.binding_failed,
        Condition::new(
            ConditionStatus::True,
            "BindingFailed",
            Some(message.clone()),
            generation,
        ),
    );
    set_condition(
        &mut status.ready,
        Condition::new(
            ConditionStatus::False,
            "BindingFailed",
            Some(message.clone()),
            generation,
        ),
    );
    ReconcileOutcome::no_requeue("BindingFailed", Some(message))
}

fn fail_unbinding(
    binding: &mut CFServiceBinding,
    reason: &'static str,
    message: String,
) -> ReconcileOutcome {
    warn!(binding = %binding.name_any(), reason, error = %message, "unbinding failed");
    let generation = binding.metadata.generation;
    advance(binding, LastOperationState::Failed, Some(message.clone()));
    set_condition(
        &mut binding.status_entry().unbinding_failed,
        Condition::new(ConditionStatus::True, reason, Some(message.clone()), generation),
    );
    ReconcileOutcome::no_requeue(reason, Some(message))
}

fn finalized(binding: &mut CFServiceBinding) -> ReconcileOutcome {
    advance(binding, LastOperationState::Succeeded, None);
    remove_finalizer(binding, MANAGED_BINDING_FINALIZER);
    info!(binding = %binding.name_any(), "unbound, finalizer removed");
    ReconcileOutcome::Done
}
