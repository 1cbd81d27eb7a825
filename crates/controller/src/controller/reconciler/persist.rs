//! # Persistence
//!
//! Writes back what a reconcile changed, guarded by the `resourceVersion` the
//! reconcile started from. Status goes first so a removed finalizer can never
//! delete the object before its final status is recorded.

use super::ReconcilerError;
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Unchanged,
    Persisted,
    /// The object no longer exists
    Deleted,
    /// Someone else wrote first; the next reconcile starts from their version
    Conflict,
}

/// Fields a reconcile may change
#[derive(Debug, Default, PartialEq)]
struct Changes {
    status: Option<Value>,
    finalizers: Option<Value>,
    spec: Option<Value>,
}

/// JSON merge patch (RFC 7386) turning `before` into `after`
///
/// Keys missing from `after` are sent as `null`, which the API server treats as
/// removal. Arrays and scalars are replaced whole.
fn merge_patch(before: Option<&Value>, after: Option<&Value>) -> Option<Value> {
    if before == after {
        return None;
    }
    match (before, after) {
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            let mut patch = serde_json::Map::new();
            for (key, value) in new {
                if let Some(change) = merge_patch(old.get(key), Some(value)) {
                    patch.insert(key.clone(), change);
                }
            }
            for key in old.keys().filter(|key| !new.contains_key(*key)) {
                patch.insert(key.clone(), Value::Null);
            }
            Some(Value::Object(patch))
        }
        (_, Some(new)) => Some(new.clone()),
        (_, None) => Some(Value::Null),
    }
}

fn diff(before: &Value, after: &Value) -> Changes {
    let changed = |pointer: &str| merge_patch(before.pointer(pointer), after.pointer(pointer));
    Changes {
        status: changed("/status"),
        finalizers: changed("/metadata/finalizers").map(|f| if f.is_null() { json!([]) } else { f }),
        spec: changed("/spec"),
    }
}

fn serialize<K: Serialize>(obj: &K) -> Result<Value, ReconcilerError> {
    serde_json::to_value(obj)
        .map_err(|e| ReconcilerError::Store(crate::store::StoreError::Other(e.to_string())))
}

/// Persist the difference between `before` and `after`
///
/// # Errors
///
/// API failures other than 404 and 409.
pub async fn persist<K>(api: &Api<K>, before: &K, after: &K) -> Result<PersistOutcome, ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
{
    let changes = diff(&serialize(before)?, &serialize(after)?);
    if changes == Changes::default() {
        return Ok(PersistOutcome::Unchanged);
    }

    let name = after.name_any();
    let mut resource_version = before.resource_version();
    let params = PatchParams::default();

    if let Some(status) = changes.status {
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        match api.patch_status(&name, &params, &Patch::Merge(&patch)).await {
            Ok(updated) => resource_version = updated.resource_version(),
            Err(e) => return classify(e, after),
        }
    }

    if changes.finalizers.is_some() || changes.spec.is_some() {
        let mut patch = json!({ "metadata": { "resourceVersion": resource_version } });
        if let Some(finalizers) = changes.finalizers {
            patch["metadata"]["finalizers"] = finalizers;
        }
        if let Some(spec) = changes.spec {
            patch["spec"] = spec;
        }
        if let Err(e) = api.patch(&name, &params, &Patch::Merge(&patch)).await {
            return classify(e, after);
        }
    }

    debug!(kind = %K::kind(&()), name = %name, "changes persisted");
    Ok(PersistOutcome::Persisted)
}

fn classify<K>(error: kube::Error, obj: &K) -> Result<PersistOutcome, ReconcilerError>
where
    K: Resource<DynamicType = ()>,
{
    match error {
        kube::Error::Api(ae) if ae.code == 404 => Ok(PersistOutcome::Deleted),
        kube::Error::Api(ae) if ae.code == 409 => Ok(PersistOutcome::Conflict),
        source => Err(ReconcilerError::Persist {
            kind: K::kind(&()).into_owned(),
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
            source,
        }),
    }
}
