//! # Managed Instance Reconciler
//!
//! Drives a managed `CFServiceInstance` through the broker:
//!
//! ```text
//! NotStarted -> Provisioning(initial | in progress) -> Ready | ProvisioningFailed
//! Ready | ProvisioningFailed -> Deprovisioning(initial | in progress) -> Removed
//! ```
//!
//! Each invocation makes at most one broker call and returns. Asynchronous
//! operations are polled on later invocations with the token the broker
//! returned, which is kept in status until the operation ends.

use super::finalizer::{add_finalizer, has_finalizer, is_deleting, purge_requested, remove_finalizer};
use super::secrets::load_parameters;
use super::{ReconcileOutcome, ReconcilerError};
use crate::assets::{AssetError, Assets, InstanceAssets};
use crate::constants::MANAGED_INSTANCE_FINALIZER;
use crate::crd::{
    begin_operation, set_condition, CFServiceInstance, CFServicePlan, Condition,
    ConditionStatus, LastOperationState, LastOperationType,
};
use crate::osbapi::{
    BrokerClient, BrokerClientFactory, DeprovisionPayload, LastOperationRequest,
    OperationState, ProvisionPayload, ProvisionRequest,
};
use crate::store::SecretStore;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PLAN_DISABLED_MESSAGE: &str = "The service plan is disabled";

pub struct ManagedInstanceReconciler {
    assets: Assets,
    clients: Arc<dyn BrokerClientFactory>,
    secrets: Arc<dyn SecretStore>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ManagedInstanceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInstanceReconciler")
            .field("assets", &self.assets)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ManagedInstanceReconciler {
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

    /// Advance the instance one step
    ///
    /// Mutates status, the service label and finalizers in place; the caller persists them.
    ///
    /// # Errors
    ///
    /// Recoverable failures (broker unavailable, store errors). Status conditions
    /// are left untouched on these paths.
    pub async fn reconcile(
        &self,
        instance: &mut CFServiceInstance,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = instance.metadata.generation;
        instance.status_entry().observed_generation = generation;

        if is_deleting(instance) {
            return self.finalize(instance).await;
        }

        if add_finalizer(instance, MANAGED_INSTANCE_FINALIZER) {
            debug!(instance = %instance.name_any(), "finalizer added");
        }

        if instance.is_ready() {
            return self.refresh_upgrade_available(instance).await;
        }

        if instance.status_entry().is_provisioning_failed() {
            return Ok(ReconcileOutcome::no_requeue("ProvisioningFailed", None));
        }

        let namespace = instance.namespace().unwrap_or_default();
        let assets = match self.assets.for_instance(instance).await {
            Ok(assets) => assets,
            Err(e) => return self.assets_unavailable(instance, e),
        };
        let space = match self.assets.space(&namespace).await {
            Ok(space) => space,
            Err(e) => return self.assets_unavailable(instance, e),
        };

        if !assets.plan.spec.visibility.allows(&space.org_guid) {
            warn!(
                instance = %instance.name_any(),
                plan = %assets.plan.name_any(),
                org = %space.org_guid,
                "service plan is not visible to the instance's organization"
            );
            set_condition(
                &mut instance.status_entry().ready,
                Condition::new(
                    ConditionStatus::False,
                    "InvalidServicePlan",
                    Some(PLAN_DISABLED_MESSAGE.to_owned()),
                    generation,
                ),
            );
            return Ok(ReconcileOutcome::no_requeue(
                "InvalidServicePlan",
                Some(PLAN_DISABLED_MESSAGE.to_owned()),
            ));
        }

        if instance.spec.service_label.is_none() {
            instance.spec.service_label = Some(assets.offering.spec.name.clone());
        }

        let client = self.clients.create_client(&assets.broker).await?;

        if instance.status_entry().provision_requested {
            return self.poll_provision(instance, &assets, client.as_ref()).await;
        }

        let parameters = match load_parameters(
            self.secrets.as_ref(),
            &namespace,
            instance.spec.parameters_ref.as_ref(),
        )
        .await
        {
            Ok(parameters) => parameters,
            Err(ReconcilerError::Credentials(e)) => {
                let message = format!("invalid parameters: {e}");
                set_condition(
                    &mut instance.status_entry().ready,
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
        let payload = ProvisionPayload {
            instance_id: instance.name_any(),
            request: ProvisionRequest::new(
                service_id,
                plan_id,
                space.org_guid,
                space.space_guid,
                parameters,
            ),
        };
        self.provision(instance, &assets.plan, &payload, client.as_ref())
            .await
    }

    async fn provision(
        &self,
        instance: &mut CFServiceInstance,
        plan: &CFServicePlan,
        payload: &ProvisionPayload,
        client: &dyn BrokerClient,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        begin_operation(&mut instance.status_entry().last_operation, LastOperationType::Create);

        match client.provision(payload).await {
            Ok(response) if response.is_complete() => {
                info!(instance = %payload.instance_id, "provisioned synchronously");
                mark_ready(instance, plan, None);
                Ok(ReconcileOutcome::Done)
            }
            Ok(response) => {
                info!(
                    instance = %payload.instance_id,
                    operation = response.operation.as_deref().unwrap_or_default(),
                    "provision accepted, polling last operation"
                );
                let status = instance.status_entry();
                status.provision_requested = true;
                status.provision_operation = response.operation;
                advance(instance, LastOperationState::InProgress, None);
                Ok(ReconcileOutcome::requeue_after(
                    "ProvisionRequested",
                    self.poll_interval,
                ))
            }
            Err(e) if e.is_unrecoverable() => Ok(fail_provisioning(instance, e.to_string())),
            Err(e) => {
                warn!(instance = %payload.instance_id, error = %e, "provision failed, will retry");
                Err(e.into())
            }
        }
    }

    async fn poll_provision(
        &self,
        instance: &mut CFServiceInstance,
        assets: &InstanceAssets,
        client: &dyn BrokerClient,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let (service_id, plan_id) = assets.catalog_ids();
        let request = LastOperationRequest {
            instance_id: instance.name_any(),
            binding_id: None,
            service_id: service_id.to_owned(),
            plan_id: plan_id.to_owned(),
            operation: instance.status_entry().provision_operation.clone(),
        };

        match client.get_last_operation(&request).await {
            Ok(last) => match last.state {
                OperationState::InProgress => {
                    advance(instance, LastOperationState::InProgress, last.description);
                    Ok(ReconcileOutcome::requeue_after(
                        "ProvisionInProgress",
                        self.poll_interval,
                    ))
                }
                OperationState::Succeeded => {
                    info!(instance = %request.instance_id, "asynchronous provision succeeded");
                    mark_ready(instance, &assets.plan, last.description);
                    Ok(ReconcileOutcome::Done)
                }
                OperationState::Failed => Ok(fail_provisioning(
                    instance,
                    last.description
                        .unwrap_or_else(|| "provision failed".to_owned()),
                )),
            },
            Err(e) if e.is_gone() || e.is_unrecoverable() => {
                Ok(fail_provisioning(instance, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ready instances are never re-provisioned; only `upgradeAvailable` is recomputed
    async fn refresh_upgrade_available(
        &self,
        instance: &mut CFServiceInstance,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let plan = match self.assets.for_instance(instance).await {
            Ok(assets) => assets.plan,
            Err(e) if e.is_not_found() => {
                debug!(instance = %instance.name_any(), error = %e, "plan unavailable, keeping upgrade status");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        };
        let current = plan.spec.maintenance_info.map(|m| m.version);
        let status = instance.status_entry();
        status.upgrade_available = match (&status.maintenance_info_version, &current) {
            (Some(stored), Some(current)) => stored != current,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        Ok(ReconcileOutcome::Done)
    }

    async fn finalize(
        &self,
        instance: &mut CFServiceInstance,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !has_finalizer(instance, MANAGED_INSTANCE_FINALIZER) {
            return Ok(ReconcileOutcome::Done);
        }
        instance.status_entry().deletion_requested = true;

        if purge_requested(instance) {
            warn!(instance = %instance.name_any(), "purge requested, removing finalizer without deprovisioning");
            remove_finalizer(instance, MANAGED_INSTANCE_FINALIZER);
            return Ok(ReconcileOutcome::Done);
        }

        if instance.status_entry().is_deprovisioning_failed() {
            return Ok(ReconcileOutcome::no_requeue("DeprovisioningFailed", None));
        }

        let assets = match self.assets.for_instance(instance).await {
            Ok(assets) => assets,
            Err(e) if e.is_not_found() => {
                return Ok(fail_deprovisioning(instance, "AssetsNotFound", e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let client = self.clients.create_client(&assets.broker).await?;
        let (service_id, plan_id) = assets.catalog_ids();

        if instance.status_entry().deprovision_requested {
            let request = LastOperationRequest {
                instance_id: instance.name_any(),
                binding_id: None,
                service_id: service_id.to_owned(),
                plan_id: plan_id.to_owned(),
                operation: instance.status_entry().deprovision_operation.clone(),
            };
            return match client.get_last_operation(&request).await {
                Ok(last) => match last.state {
                    OperationState::InProgress => {
                        advance(instance, LastOperationState::InProgress, last.description);
                        Ok(ReconcileOutcome::requeue_after(
                            "DeprovisionInProgress",
                            self.poll_interval,
                        ))
                    }
                    OperationState::Succeeded => Ok(finalized(instance, last.description)),
                    OperationState::Failed => Ok(fail_deprovisioning(
                        instance,
                        "DeprovisionFailed",
                        last.description
                            .unwrap_or_else(|| "deprovision failed".to_owned()),
                    )),
                },
                Err(e) if e.is_gone() => Ok(finalized(instance, None)),
                Err(e) if e.is_unrecoverable() => Ok(fail_deprovisioning(
                    instance,
                    "DeprovisionFailed",
                    e.to_string(),
                )),
                Err(e) => Err(e.into()),
            };
        }

        begin_operation(&mut instance.status_entry().last_operation, LastOperationType::Delete);
        let payload = DeprovisionPayload {
            instance_id: instance.name_any(),
            service_id: service_id.to_owned(),
            plan_id: plan_id.to_owned(),
        };
        match client.deprovision(&payload).await {
            Ok(response) if response.is_complete() => Ok(finalized(instance, None)),
            Ok(response) => {
                let status = instance.status_entry();
                status.deprovision_requested = true;
                status.deprovision_operation = response.operation;
                advance(instance, LastOperationState::InProgress, None);
                Ok(ReconcileOutcome::requeue_after(
                    "DeprovisionRequested",
                    self.poll_interval,
                ))
            }
            Err(e) if e.is_gone() => {
                info!(instance = %payload.instance_id, "broker reports instance already gone");
                Ok(finalized(instance, None))
            }
            Err(e) if e.is_unrecoverable() => Ok(fail_deprovisioning(
                instance,
                "DeprovisionFailed",
                e.to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn assets_unavailable(
        &self,
        instance: &mut CFServiceInstance,
        error: AssetError,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !error.is_not_found() {
            return Err(error.into());
        }
        let message = error.to_string();
        warn!(instance = %instance.name_any(), error = %message, "assets not found");
        let generation = instance.metadata.generation;
        set_condition(
            &mut instance.status_entry().ready,
            Condition::new(
                ConditionStatus::False,
                "AssetsNotFound",
                Some(message.clone()),
                generation,
            ),
        );
        Ok(ReconcileOutcome::no_requeue("AssetsNotFound", Some(message)))
    }
}

fn advance(instance: &mut CFServiceInstance, state: LastOperationState, description: Option<String>) {
    if let Some(op) = instance.status_entry().last_operation.as_mut() {
        op.advance(state, description);
    }
}

fn mark_ready(instance: &mut CFServiceInstance, plan: &CFServicePlan, description: Option<String>) {
    let generation = instance.metadata.generation;
    advance(instance, LastOperationState::Succeeded, description);
    let status = instance.status_entry();
    status.maintenance_info_version = plan.spec.maintenance_info.as_ref().map(|m| m.version.clone());
    status.upgrade_available = false;
    set_condition(
        &mut status.ready,
        Condition::new(ConditionStatus::True, "Provisioned", None, generation),
    );
}

fn fail_provisioning(instance: &mut CFServiceInstance, message: String) -> ReconcileOutcome {
    warn!(instance = %instance.name_any(), error = %message, "provisioning failed");
    let generation = instance.metadata.generation;
    advance(instance, LastOperationState::Failed, Some(message.clone()));
    let status = instance.status_entry();
    set_condition(
        &mut status.provisioning_failed,
        Condition::new(
            ConditionStatus::True,
            "ProvisionFailed",
            Some(message.clone()),
            generation,
        ),
    );
    set_condition(
        &mut status.ready,
        Condition::new(
            ConditionStatus::False,
            "ProvisionFailed",
            Some(message.clone()),
            generation,
        ),
    );
    ReconcileOutcome::no_requeue("ProvisionFailed", Some(message))
}

fn fail_deprovisioning(
    instance: &mut CFServiceInstance,
    reason: &'static str,
    message: String,
) -> ReconcileOutcome {
    warn!(instance = %instance.name_any(), reason, error = %message, "deprovisioning failed");
    let generation = instance.metadata.generation;
    advance(instance, LastOperationState::Failed, Some(message.clone()));
    set_condition(
        &mut instance.status_entry().deprovisioning_failed,
        Condition::new(ConditionStatus::True, reason, Some(message.clone()), generation),
    );
    ReconcileOutcome::no_requeue(reason, Some(message))
}

fn finalized(instance: &mut CFServiceInstance, description: Option<String>) -> ReconcileOutcome {
    advance(instance, LastOperationState::Succeeded, description);
    remove_finalizer(instance, MANAGED_INSTANCE_FINALIZER);
    info!(instance = %instance.name_any(), "deprovisioned, finalizer removed");
    ReconcileOutcome::Done
}
