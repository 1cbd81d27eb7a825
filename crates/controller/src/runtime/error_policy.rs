//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.

use crate::controller::reconciler::reconcile::{backoff_key, resource_key};
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing broker does not slow
/// down retries of unrelated resources. A successful reconcile clears it.
pub fn handle_reconciliation_error<K>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
        error.kind = error.as_str(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "reconciliation failed");
    metrics::increment_reconciliation_errors(&kind);

    let (backoff_seconds, error_count) = ctx.backoffs.record_error(&resource_key(obj.as_ref()));

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );

    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Log each item of a controller's result stream
///
/// Reconcile failures were already handled by [`handle_reconciliation_error`];
/// only watch and queue failures are surfaced here. A scheduled retry of an
/// object that no longer exists drops its backoff state.
pub fn log_reconcile_result<K>(
    kind: &'static str,
    ctx: Arc<Reconciler>,
) -> impl Fn(
    Result<(ObjectRef<K>, Action), controller::Error<ReconcilerError, watcher::Error>>,
) -> std::future::Ready<()>
where
    K: Resource<DynamicType = ()>,
{
    move |result| {
        match result {
            Ok((object, action)) => debug!(resource.kind = kind, %object, ?action, "reconcile finished"),
            Err(controller::Error::ReconcilerFailed(e, object)) => {
                debug!(resource.kind = kind, %object, error = %e, "retry scheduled");
            }
            Err(controller::Error::ObjectNotFound(object)) => {
                debug!(resource.kind = kind, %object, "object no longer exists");
                ctx.backoffs
                    .forget(&backoff_key(kind, object.namespace.as_deref(), &object.name));
            }
            Err(e) => warn!(resource.kind = kind, error = %e, "controller stream error"),
        }
        std::future::ready(())
    }
}
