//! # User-Provided Reconcilers
//!
//! User-provided instances carry their credentials in a secret and never talk to
//! a broker. Their bindings copy those credentials into the same two secrets a
//! managed binding gets.

use super::secrets::materialize_binding_secrets;
use super::{ReconcileOutcome, ReconcilerError};
use crate::assets::Assets;
use crate::credentials;
use crate::crd::{
    begin_operation, set_condition, CFServiceBinding, CFServiceInstance, Condition,
    ConditionStatus, LastOperationState, LastOperationType,
};
use crate::osbapi::JsonObject;
use crate::store::SecretStore;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of reading an instance's credentials secret
enum CredentialsLookup {
    Found(JsonObject),
    /// Not ready yet; the reason to report
    Pending(&'static str, String),
    /// Terminal
    Invalid(String),
}

async fn lookup_credentials(
    secrets: &dyn SecretStore,
    instance: &CFServiceInstance,
) -> Result<CredentialsLookup, ReconcilerError> {
    let namespace = instance.namespace().unwrap_or_default();
    let Some(secret_ref) = instance.spec.credentials_ref.as_ref() else {
        return Ok(CredentialsLookup::Invalid(
            "user-provided instance has no credentialsRef".to_owned(),
        ));
    };
    let Some(data) = secrets.get(&namespace, &secret_ref.name).await? else {
        return Ok(CredentialsLookup::Pending(
            "CredentialsSecretNotFound",
            format!("secret {namespace}/{} not found", secret_ref.name),
        ));
    };
    Ok(match credentials::get_credentials(&data) {
        Ok(creds) => CredentialsLookup::Found(creds),
        Err(e) => CredentialsLookup::Invalid(e.to_string()),
    })
}

pub struct UserProvidedInstanceReconciler {
    secrets: Arc<dyn SecretStore>,
    missing_secret_requeue: Duration,
}

impl UserProvidedInstanceReconciler {
    pub fn new(secrets: Arc<dyn SecretStore>, missing_secret_requeue: Duration) -> Self {
        Self {
            secrets,
            missing_secret_requeue,
        }
    }

    /// Mark the instance ready once its credentials secret is readable
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn reconcile(
        &self,
        instance: &mut CFServiceInstance,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = instance.metadata.generation;
        instance.status_entry().observed_generation = generation;
        if instance.metadata.deletion_timestamp.is_some() {
            return Ok(ReconcileOutcome::Done);
        }

        let (reason, message, outcome) = match lookup_credentials(self.secrets.as_ref(), instance).await? {
            CredentialsLookup::Found(_) => {
                begin_operation(&mut instance.status_entry().last_operation, LastOperationType::Create)
                    .advance(LastOperationState::Succeeded, None);
                set_condition(
                    &mut instance.status_entry().ready,
                    Condition::new(ConditionStatus::True, "CredentialsAvailable", None, generation),
                );
                return Ok(ReconcileOutcome::Done);
            }
            CredentialsLookup::Pending(reason, message) => {
                debug!(instance = %instance.name_any(), %message, "credentials not available yet");
                (
                    reason,
                    message,
                    ReconcileOutcome::requeue_after(reason, self.missing_secret_requeue),
                )
            }
            CredentialsLookup::Invalid(message) => {
                warn!(instance = %instance.name_any(), error = %message, "invalid credentials");
                (
                    "CredentialsMalformed",
                    message.clone(),
                    ReconcileOutcome::no_requeue("CredentialsMalformed", Some(message)),
                )
            }
        };
        set_condition(
            &mut instance.status_entry().ready,
            Condition::new(ConditionStatus::False, reason, Some(message), generation),
        );
        Ok(outcome)
    }
}

pub struct UserProvidedBindingReconciler {
    assets: Assets,
    secrets: Arc<dyn SecretStore>,
    requeue_interval: Duration,
}

impl UserProvidedBindingReconciler {
    pub fn new(assets: Assets, secrets: Arc<dyn SecretStore>, requeue_interval: Duration) -> Self {
        Self {
            assets,
            secrets,
            requeue_interval,
        }
    }

    /// Copy the instance's credentials into the binding secrets
    ///
    /// Runs on every reconcile so rotated instance credentials reach the binding.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn reconcile(
        &self,
        binding: &mut CFServiceBinding,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = binding.metadata.generation;
        binding.status_entry().observed_generation = generation;
        if binding.metadata.deletion_timestamp.is_some() {
            return Ok(ReconcileOutcome::Done);
        }

        let namespace = binding.namespace().unwrap_or_default();
        let instance = match self
            .assets
            .instance(&namespace, &binding.spec.service_instance_ref.name)
            .await
        {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                return Ok(not_ready(
                    binding,
                    "AssetsNotFound",
                    e.to_string(),
                    ReconcileOutcome::no_requeue("AssetsNotFound", Some(e.to_string())),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if !instance.is_ready() {
            return Ok(not_ready(
                binding,
                "ServiceInstanceNotReady",
                format!("service instance {} is not ready", instance.name_any()),
                ReconcileOutcome::requeue_after("ServiceInstanceNotReady", self.requeue_interval),
            ));
        }

        match lookup_credentials(self.secrets.as_ref(), &instance).await? {
            CredentialsLookup::Found(creds) => {
                begin_operation(&mut binding.status_entry().last_operation, LastOperationType::Create);
                materialize_binding_secrets(self.secrets.as_ref(), binding, &creds).await?;
                if let Some(op) = binding.status_entry().last_operation.as_mut() {
                    op.advance(LastOperationState::Succeeded, None);
                }
                Ok(ReconcileOutcome::Done)
            }
            CredentialsLookup::Pending(reason, message) => Ok(not_ready(
                binding,
                reason,
                message,
                ReconcileOutcome::requeue_after(reason, self.requeue_interval),
            )),
            CredentialsLookup::Invalid(message) => Ok(not_ready(
                binding,
                "CredentialsMalformed",
                message.clone(),
                ReconcileOutcome::no_requeue("CredentialsMalformed", Some(message)),
            )),
        }
    }
}

fn not_ready(
    binding: &mut CFServiceBinding,
    reason: &'static str,
    message: String,
    outcome: ReconcileOutcome,
) -> ReconcileOutcome {
    let generation = binding.metadata.generation;
    set_condition(
        &mut binding.status_entry().ready,
        Condition::new(ConditionStatus::False, reason, Some(message), generation),
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::Requeue;
    use crate::test_support::{fixtures, FakeAssetStore, FakeSecretStore};

    const RETRY: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn instance_is_ready_when_credentials_parse() {
        let secrets = Arc::new(FakeSecretStore::default());
        secrets.put(
            fixtures::SPACE_NAMESPACE,
            "upsi-creds",
            &[("credentials", r#"{"user":"admin"}"#)],
        );
        let reconciler = UserProvidedInstanceReconciler::new(secrets, RETRY);
        let mut instance = fixtures::user_provided_instance("upsi", "upsi-creds");

        let outcome = reconciler.reconcile(&mut instance).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(instance.is_ready());
        assert!(instance.finalizers().is_empty());
    }

    #[tokio::test]
    async fn instance_waits_for_missing_secret() {
        let reconciler =
            UserProvidedInstanceReconciler::new(Arc::new(FakeSecretStore::default()), RETRY);
        let mut instance = fixtures::user_provided_instance("upsi", "upsi-creds");

        let outcome = reconciler.reconcile(&mut instance).await.unwrap();

        assert_eq!(outcome.reason(), Some("CredentialsSecretNotFound"));
        assert_eq!(outcome.requeue(), Some(Requeue::After(RETRY)));
        assert!(!instance.is_ready());
    }

    #[tokio::test]
    async fn malformed_credentials_are_terminal() {
        let secrets = Arc::new(FakeSecretStore::default());
        secrets.put(fixtures::SPACE_NAMESPACE, "upsi-creds", &[("credentials", "\"text\"")]);
        let reconciler = UserProvidedInstanceReconciler::new(secrets, RETRY);
        let mut instance = fixtures::user_provided_instance("upsi", "upsi-creds");

        let outcome = reconciler.reconcile(&mut instance).await.unwrap();

        assert_eq!(outcome.reason(), Some("CredentialsMalformed"));
        assert_eq!(outcome.requeue(), Some(Requeue::Never));
    }

    #[tokio::test]
    async fn binding_copies_instance_credentials() {
        let store = Arc::new(FakeAssetStore::with_catalog());
        let secrets = Arc::new(FakeSecretStore::default());
        secrets.put(
            fixtures::SPACE_NAMESPACE,
            "upsi-creds",
            &[("credentials", r#"{"user":"admin","type":"mysql"}"#)],
        );
        let mut instance = fixtures::user_provided_instance("upsi", "upsi-creds");
        UserProvidedInstanceReconciler::new(secrets.clone(), RETRY)
            .reconcile(&mut instance)
            .await
            .unwrap();
        store.put_instance(instance);

        let reconciler = UserProvidedBindingReconciler::new(
            Assets::new(store, fixtures::ROOT_NAMESPACE),
            secrets.clone(),
            RETRY,
        );
        let mut binding = fixtures::binding("b-1", "upsi");
        let outcome = reconciler.reconcile(&mut binding).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(binding.status.as_ref().unwrap().is_materialized());
        let normalized = secrets
            .written(fixtures::SPACE_NAMESPACE, "b-1-sbio")
            .unwrap();
        assert_eq!(normalized.secret_type.as_deref(), Some("servicebinding.io/mysql"));
        assert_eq!(normalized.data["user"], b"admin".to_vec());
    }

    #[tokio::test]
    async fn binding_waits_for_instance() {
        let store = Arc::new(FakeAssetStore::with_catalog());
        store.put_instance(fixtures::user_provided_instance("upsi", "upsi-creds"));
        let reconciler = UserProvidedBindingReconciler::new(
            Assets::new(store, fixtures::ROOT_NAMESPACE),
            Arc::new(FakeSecretStore::default()),
            RETRY,
        );
        let mut binding = fixtures::binding("b-1", "upsi");

        let outcome = reconciler.reconcile(&mut binding).await.unwrap();

        assert_eq!(outcome.reason(), Some("ServiceInstanceNotReady"));
        assert!(!binding.status.as_ref().unwrap().is_materialized());
    }
}
