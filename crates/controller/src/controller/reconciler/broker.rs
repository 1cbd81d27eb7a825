//! # Broker Catalog Reconciler
//!
//! Fetches a broker's catalog and mirrors it into `CFServiceOffering` and
//! `CFServicePlan` objects owned by the broker.
//!
//! Object names are UUID v5 of the broker name and the catalog ID, so a re-run
//! rewrites the same objects. Plan visibility is operator-owned: new plans start
//! as `admin`, existing plans keep whatever was set.

use super::{ReconcileOutcome, ReconcilerError};
use crate::crd::{
    set_condition, CFServiceBroker, CFServiceOffering, CFServiceOfferingSpec, CFServicePlan,
    CFServicePlanSpec, Condition, ConditionStatus, LocalObjectRef, MaintenanceInfo,
    OfferingCatalog, PlanCatalog, PlanVisibility,
};
use crate::osbapi::{BrokerClientFactory, CatalogPlan, CatalogService, ClientCreationError};
use crate::store::{AssetStore, CatalogWriter};
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Deterministic object name for a catalog entry of a broker
pub fn catalog_object_name(broker_name: &str, catalog_id: &str) -> String {
    let broker_ns = Uuid::new_v5(&Uuid::NAMESPACE_OID, broker_name.as_bytes());
    Uuid::new_v5(&broker_ns, catalog_id.as_bytes()).to_string()
}

pub struct BrokerReconciler {
    clients: Arc<dyn BrokerClientFactory>,
    assets: Arc<dyn AssetStore>,
    writer: Arc<dyn CatalogWriter>,
    missing_secret_requeue: Duration,
}

impl BrokerReconciler {
    pub fn new(
        clients: Arc<dyn BrokerClientFactory>,
        assets: Arc<dyn AssetStore>,
        writer: Arc<dyn CatalogWriter>,
        missing_secret_requeue: Duration,
    ) -> Self {
        Self {
            clients,
            assets,
            writer,
            missing_secret_requeue,
        }
    }

    /// # Errors
    ///
    /// Recoverable broker failures and store failures.
    pub async fn reconcile(
        &self,
        broker: &mut CFServiceBroker,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = broker.metadata.generation;
        broker.status_entry().observed_generation = generation;
        if broker.metadata.deletion_timestamp.is_some() {
            return Ok(ReconcileOutcome::Done);
        }

        let client = match self.clients.create_client(broker).await {
            Ok(client) => client,
            Err(ClientCreationError::Store(e)) => return Err(e.into()),
            Err(e) => {
                let message = e.to_string();
                warn!(broker = %broker.name_any(), error = %message, "broker credentials unavailable");
                set_ready(broker, ConditionStatus::False, "CredentialsSecretNotAvailable", Some(message));
                return Ok(ReconcileOutcome::requeue_after(
                    "CredentialsSecretNotAvailable",
                    self.missing_secret_requeue,
                ));
            }
        };

        let catalog = match client.get_catalog().await {
            Ok(catalog) => catalog,
            Err(e) if e.is_unrecoverable() => {
                let message = e.to_string();
                set_ready(broker, ConditionStatus::False, "GetCatalogFailed", Some(message.clone()));
                return Ok(ReconcileOutcome::no_requeue("GetCatalogFailed", Some(message)));
            }
            Err(e) => return Err(e.into()),
        };

        let namespace = broker.namespace().unwrap_or_default();
        let owner = broker.controller_owner_ref(&());
        let broker_name = broker.name_any();
        let mut plans = 0u32;
        for service in &catalog.services {
            let offering = offering_for(&namespace, &broker_name, owner.clone(), service);
            self.writer.apply_offering(&offering).await?;
            for plan in &service.plans {
                let mut desired = plan_for(&namespace, &broker_name, owner.clone(), &offering, plan);
                if let Some(existing) = self.assets.get_plan(&namespace, &desired.name_any()).await? {
                    desired.spec.visibility = existing.spec.visibility;
                }
                self.writer.apply_plan(&desired).await?;
                plans += 1;
            }
        }

        let offerings = u32::try_from(catalog.services.len()).unwrap_or(u32::MAX);
        info!(
            broker = %broker_name,
            offerings,
            plans,
            "catalog synchronized"
        );
        let status = broker.status_entry();
        status.offerings = Some(offerings);
        status.plans = Some(plans);
        status.last_catalog_sync_time = Some(Utc::now().to_rfc3339());
        set_ready(broker, ConditionStatus::True, "CatalogSynced", None);
        Ok(ReconcileOutcome::Done)
    }
}

fn set_ready(
    broker: &mut CFServiceBroker,
    status: ConditionStatus,
    reason: &'static str,
    message: Option<String>,
) {
    let generation = broker.metadata.generation;
    set_condition(
        &mut broker.status_entry().ready,
        Condition::new(status, reason, message, generation),
    );
}

fn owned<K: Resource>(mut obj: K, namespace: &str, owner: Option<OwnerReference>) -> K {
    let meta = obj.meta_mut();
    meta.namespace = Some(namespace.to_owned());
    meta.owner_references = owner.map(|o| vec![o]);
    obj
}

fn offering_for(
    namespace: &str,
    broker_name: &str,
    owner: Option<OwnerReference>,
    service: &CatalogService,
) -> CFServiceOffering {
    let name = catalog_object_name(broker_name, &service.id);
    owned(
        CFServiceOffering::new(
            &name,
            CFServiceOfferingSpec {
                name: service.name.clone(),
                description: service.description.clone(),
                tags: service.tags.clone(),
                requires: service.requires.clone(),
                broker_ref: LocalObjectRef::new(broker_name),
                broker_catalog: OfferingCatalog {
                    id: service.id.clone(),
                    bindable: service.bindable,
                    plan_updateable: service.plan_updateable,
                    instances_retrievable: service.instances_retrievable,
                    bindings_retrievable: service.bindings_retrievable,
                },
            },
        ),
        namespace,
        owner,
    )
}

fn plan_for(
    namespace: &str,
    broker_name: &str,
    owner: Option<OwnerReference>,
    offering: &CFServiceOffering,
    plan: &CatalogPlan,
) -> CFServicePlan {
    let name = catalog_object_name(broker_name, &plan.id);
    owned(
        CFServicePlan::new(
            &name,
            CFServicePlanSpec {
                name: plan.name.clone(),
                description: plan.description.clone(),
                free: plan.free.unwrap_or(true),
                bindable: plan.bindable,
                offering_ref: LocalObjectRef::new(offering.name_any()),
                broker_catalog: PlanCatalog { id: plan.id.clone() },
                visibility: PlanVisibility::default(),
                maintenance_info: plan.maintenance_info.as_ref().map(|m| MaintenanceInfo {
                    version: m.version.clone(),
                    description: m.description.clone(),
                }),
            },
        ),
        namespace,
        owner,
    )
}
