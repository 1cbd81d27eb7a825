//! Finalizer and lifecycle helpers over any Kubernetes resource.

use crate::constants::PURGE_ANNOTATION;
use kube::{Resource, ResourceExt};

pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Returns whether the finalizer was added
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().push(finalizer.to_owned());
    true
}

/// Returns whether the finalizer was present
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    let finalizers = obj.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

/// An operator asked to finalize deletion without contacting the broker
pub fn purge_requested<K: Resource>(obj: &K) -> bool {
    obj.annotations()
        .get(PURGE_ANNOTATION)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}
