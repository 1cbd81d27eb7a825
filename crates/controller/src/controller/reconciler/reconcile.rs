//! # Reconcile Entry Points
//!
//! Functions handed to `kube_runtime::Controller::run`. Each one:
//!
//! 1. Clones the cached object and routes it to the matching reconciler
//! 2. Bounds the step by the configured reconcile timeout
//! 3. Persists whatever the step changed, even when the step failed
//! 4. Maps the outcome to an [`Action`]
//!
//! A timed-out step is not persisted: the in-flight broker request was dropped and
//! the object is retried from its last stored state.

use super::{persist, PersistOutcome, ReconcileOutcome, Reconciler, ReconcilerError, Requeue};
use crate::constants;
use crate::crd::{CFServiceBinding, CFServiceBroker, CFServiceInstance, InstanceKind};
use crate::observability::metrics;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::Action;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Key identifying a resource in the backoff table
pub(crate) fn backoff_key(kind: &str, namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace.unwrap_or_default(), name)
}

pub(crate) fn resource_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    backoff_key(&K::kind(&()), obj.namespace().as_deref(), &obj.name_any())
}

fn api_for<K>(ctx: &Reconciler, obj: &K) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
{
    let namespace = obj
        .namespace()
        .unwrap_or_else(|| ctx.config.root_namespace.clone());
    Api::namespaced(ctx.client.clone(), &namespace)
}

async fn bounded<F>(ctx: &Reconciler, step: F) -> Result<ReconcileOutcome, ReconcilerError>
where
    F: Future<Output = Result<ReconcileOutcome, ReconcilerError>>,
{
    let limit = ctx.config.reconcile_timeout;
    tokio::time::timeout(limit, step)
        .await
        .unwrap_or(Err(ReconcilerError::Timeout(limit)))
}

fn span_for<K: Resource<DynamicType = ()>>(obj: &K) -> tracing::Span {
    tracing::info_span!(
        "controller.reconcile",
        resource.kind = %K::kind(&()),
        resource.name = %obj.name_any(),
        resource.namespace = %obj.namespace().unwrap_or_default(),
    )
}

/// Requeue policy for a finished step
pub(crate) fn action_for(outcome: &ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::NotReady { requeue, .. } => match requeue {
            Requeue::Immediately => Action::requeue(Duration::ZERO),
            Requeue::After(after) => Action::requeue(*after),
            Requeue::Never => Action::await_change(),
        },
    }
}

async fn finish<K>(
    ctx: &Reconciler,
    api: &Api<K>,
    before: &K,
    after: &K,
    result: Result<ReconcileOutcome, ReconcilerError>,
    started: Instant,
) -> Result<Action, ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
{
    let kind = K::kind(&());
    metrics::observe_reconciliation_duration(&kind, started.elapsed().as_secs_f64());

    if let Err(ReconcilerError::Timeout(limit)) = &result {
        warn!(timeout = ?limit, "reconcile timed out, changes discarded");
        return result.map(|_| Action::await_change());
    }

    match persist(api, before, after).await {
        Ok(PersistOutcome::Deleted) => {
            debug!("object deleted while reconciling");
            ctx.backoffs.forget(&resource_key(after));
            return Ok(Action::await_change());
        }
        Ok(PersistOutcome::Conflict) if result.is_ok() => {
            metrics::increment_requeues_total("conflict");
            return Ok(Action::requeue(Duration::from_millis(
                constants::DEFAULT_CONFLICT_REQUEUE_MS,
            )));
        }
        Ok(_) => {}
        Err(e) => {
            if let Err(step) = &result {
                // The step error drives the backoff; the write failure is only logged
                warn!(error = %e, step_error = %step, "failed to persist after a failed step");
            } else {
                return Err(e);
            }
        }
    }

    let outcome = result?;
    ctx.backoffs.forget(&resource_key(after));
    if let ReconcileOutcome::NotReady {
        reason,
        requeue: Requeue::Immediately | Requeue::After(_),
        ..
    } = &outcome
    {
        metrics::increment_requeues_total(reason);
    }
    info!(outcome = ?outcome.reason().unwrap_or("Ready"), "reconciled");
    Ok(action_for(&outcome))
}

/// Mirror a broker's catalog
///
/// # Errors
///
/// Any [`ReconcilerError`]; the error policy schedules the retry.
pub async fn reconcile_broker(
    obj: Arc<CFServiceBroker>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = span_for(obj.as_ref());
    async move {
        metrics::increment_reconciliations("CFServiceBroker");
        let started = Instant::now();
        let api = api_for(&ctx, obj.as_ref());
        let before = obj.as_ref().clone();
        let mut after = before.clone();
        let result = bounded(&ctx, ctx.brokers.reconcile(&mut after)).await;
        finish(&ctx, &api, &before, &after, result, started).await
    }
    .instrument(span)
    .await
}

/// Route an instance to the managed or user-provided reconciler
///
/// # Errors
///
/// Any [`ReconcilerError`]; the error policy schedules the retry.
pub async fn reconcile_instance(
    obj: Arc<CFServiceInstance>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = span_for(obj.as_ref());
    async move {
        metrics::increment_reconciliations("CFServiceInstance");
        let started = Instant::now();
        let api = api_for(&ctx, obj.as_ref());
        let before = obj.as_ref().clone();
        let mut after = before.clone();
        let result = match after.spec.kind {
            InstanceKind::Managed => bounded(&ctx, ctx.instances.reconcile(&mut after)).await,
            InstanceKind::UserProvided => {
                bounded(&ctx, ctx.user_provided_instances.reconcile(&mut after)).await
            }
        };
        finish(&ctx, &api, &before, &after, result, started).await
    }
    .instrument(span)
    .await
}

/// Route a binding by the kind of the instance it references
///
/// A binding whose instance cannot be read goes to the managed reconciler,
/// which owns finalizer handling for missing instances.
///
/// # Errors
///
/// Any [`ReconcilerError`]; the error policy schedules the retry.
pub async fn reconcile_binding(
    obj: Arc<CFServiceBinding>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = span_for(obj.as_ref());
    async move {
        metrics::increment_reconciliations("CFServiceBinding");
        let started = Instant::now();
        let api = api_for(&ctx, obj.as_ref());
        let before = obj.as_ref().clone();
        let mut after = before.clone();

        let namespace = after.namespace().unwrap_or_default();
        let user_provided = matches!(
            ctx.assets
                .instance(&namespace, &after.spec.service_instance_ref.name)
                .await,
            Ok(instance) if instance.spec.kind == InstanceKind::UserProvided
        );

        let result = if user_provided {
            bounded(&ctx, ctx.user_provided_bindings.reconcile(&mut after)).await
        } else {
            bounded(&ctx, ctx.bindings.reconcile(&mut after)).await
        };
        finish(&ctx, &api, &before, &after, result, started).await
    }
    .instrument(span)
    .await
}
