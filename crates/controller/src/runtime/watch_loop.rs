//! # Watch Loop
//!
//! Runs one kube-runtime controller per reconciled kind until a shutdown signal.
//!
//! - `CFServiceBroker` in the root namespace
//! - `CFServiceInstance` in all namespaces, also triggered by plan changes
//!   (visibility and maintenance info feed readiness and `upgradeAvailable`)
//! - `CFServiceBinding` in all namespaces, also triggered by instance changes
//!   (a binding waits for its instance to become ready)

use super::error_policy::{handle_reconciliation_error, log_reconcile_result};
use crate::controller::reconciler::{
    reconcile_binding, reconcile_broker, reconcile_instance, Reconciler,
};
use crate::crd::{CFServiceBinding, CFServiceBroker, CFServiceInstance, CFServicePlan, InstanceKind};
use anyhow::Result;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher::Config as WatcherConfig;
use kube_runtime::Controller;
use std::sync::Arc;
use tracing::info;

/// Watcher timeout (seconds), below the client read timeout so idle watches are
/// closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Managed instances referencing `plan`
pub(crate) fn instances_for_plan(
    instances: &[Arc<CFServiceInstance>],
    plan: &CFServicePlan,
) -> Vec<ObjectRef<CFServiceInstance>> {
    let plan_name = plan.name_any();
    instances
        .iter()
        .filter(|instance| instance.spec.kind == InstanceKind::Managed)
        .filter(|instance| {
            instance
                .spec
                .plan_ref
                .as_ref()
                .is_some_and(|plan_ref| plan_ref.name == plan_name)
        })
        .map(|instance| ObjectRef::from_obj(instance.as_ref()))
        .collect()
}

/// Bindings in the instance's namespace referencing it
pub(crate) fn bindings_for_instance(
    bindings: &[Arc<CFServiceBinding>],
    instance: &CFServiceInstance,
) -> Vec<ObjectRef<CFServiceBinding>> {
    let name = instance.name_any();
    let namespace = instance.namespace();
    bindings
        .iter()
        .filter(|binding| binding.namespace() == namespace)
        .filter(|binding| binding.spec.service_instance_ref.name == name)
        .map(|binding| ObjectRef::from_obj(binding.as_ref()))
        .collect()
}

/// Run the broker, instance and binding controllers until shutdown
///
/// # Errors
///
/// Currently infallible once started; each controller restarts its own watches.
pub async fn run_watch_loop(reconciler: Arc<Reconciler>) -> Result<()> {
    let client = reconciler.client.clone();
    let root_namespace = reconciler.config.root_namespace.clone();

    let brokers: Api<CFServiceBroker> = Api::namespaced(client.clone(), &root_namespace);
    let plans: Api<CFServicePlan> = Api::namespaced(client.clone(), &root_namespace);
    let instances: Api<CFServiceInstance> = Api::all(client.clone());
    let bindings: Api<CFServiceBinding> = Api::all(client);

    info!(root_namespace = %root_namespace, "starting controllers");

    let broker_controller = Controller::new(brokers, watcher_config())
        .shutdown_on_signal()
        .run(reconcile_broker, handle_reconciliation_error, reconciler.clone())
        .for_each(log_reconcile_result("CFServiceBroker", reconciler.clone()));

    let instance_controller = Controller::new(instances.clone(), watcher_config());
    let instance_store = instance_controller.store();
    let instance_controller = instance_controller
        .watches(plans, watcher_config(), move |plan| {
            instances_for_plan(&instance_store.state(), &plan)
        })
        .shutdown_on_signal()
        .run(reconcile_instance, handle_reconciliation_error, reconciler.clone())
        .for_each(log_reconcile_result("CFServiceInstance", reconciler.clone()));

    let binding_controller = Controller::new(bindings, watcher_config());
    let binding_store = binding_controller.store();
    let binding_controller = binding_controller
        .watches(instances, watcher_config(), move |instance| {
            bindings_for_instance(&binding_store.state(), &instance)
        })
        .shutdown_on_signal()
        .run(reconcile_binding, handle_reconciliation_error, reconciler.clone())
        .for_each(log_reconcile_result("CFServiceBinding", reconciler));

    futures::join!(broker_controller, instance_controller, binding_controller);
    info!("controllers stopped");
    Ok(())
}
