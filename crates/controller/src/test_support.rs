//! In-memory collaborators and fixtures for reconciler tests.

use crate::crd::{
    CFServiceBroker, CFServiceInstance, CFServiceOffering, CFServicePlan,
};
use crate::osbapi::{
    BindPayload, BindResponse, BindingRef, BrokerClient, BrokerClientFactory, BrokerError,
    Catalog, ClientCreationError, DeprovisionPayload, GetBindingResponse, LastOperationRequest,
    LastOperationResponse, OperationResponse, OperationState, ProvisionPayload,
};
use crate::store::{
    AssetStore, CatalogWriter, DesiredSecret, SecretData, SecretStore, SpaceInfo, StoreError,
};
use async_trait::async_trait;
use kube::ResourceExt;
use paths::Operation;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_owned(), name.to_owned())
}

fn key_of<K: ResourceExt>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Asset store and catalog writer backed by maps
#[derive(Default)]
pub(crate) struct FakeAssetStore {
    brokers: Mutex<BTreeMap<Key, CFServiceBroker>>,
    offerings: Mutex<BTreeMap<Key, CFServiceOffering>>,
    plans: Mutex<BTreeMap<Key, CFServicePlan>>,
    instances: Mutex<BTreeMap<Key, CFServiceInstance>>,
    spaces: Mutex<BTreeMap<String, SpaceInfo>>,
}

impl FakeAssetStore {
    /// Broker, offering, public plan and the space namespace from [`fixtures`]
    pub fn with_catalog() -> Self {
        let store = Self::default();
        store.put_broker(fixtures::broker());
        store.put_offering(fixtures::offering());
        store.put_plan(fixtures::plan());
        store.put_space(
            fixtures::SPACE_NAMESPACE,
            SpaceInfo {
                org_guid: fixtures::ORG_GUID.into(),
                space_guid: fixtures::SPACE_GUID.into(),
            },
        );
        store
    }

    pub fn put_broker(&self, broker: CFServiceBroker) {
        self.brokers.lock().unwrap().insert(key_of(&broker), broker);
    }

    pub fn put_offering(&self, offering: CFServiceOffering) {
        self.offerings.lock().unwrap().insert(key_of(&offering), offering);
    }

    pub fn put_plan(&self, plan: CFServicePlan) {
        self.plans.lock().unwrap().insert(key_of(&plan), plan);
    }

    pub fn put_instance(&self, instance: CFServiceInstance) {
        self.instances.lock().unwrap().insert(key_of(&instance), instance);
    }

    pub fn put_space(&self, namespace: &str, space: SpaceInfo) {
        self.spaces.lock().unwrap().insert(namespace.to_owned(), space);
    }

    pub fn remove_broker(&self, name: &str) {
        self.brokers
            .lock()
            .unwrap()
            .remove(&key(fixtures::ROOT_NAMESPACE, name));
    }

    pub fn remove_plan(&self, name: &str) {
        self.plans
            .lock()
            .unwrap()
            .remove(&key(fixtures::ROOT_NAMESPACE, name));
    }

    pub fn plan(&self, name: &str) -> Option<CFServicePlan> {
        self.plans
            .lock()
            .unwrap()
            .get(&key(fixtures::ROOT_NAMESPACE, name))
            .cloned()
    }

    pub fn offerings(&self) -> Vec<CFServiceOffering> {
        self.offerings.lock().unwrap().values().cloned().collect()
    }

    pub fn plans(&self) -> Vec<CFServicePlan> {
        self.plans.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl AssetStore for FakeAssetStore {
    async fn get_broker(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceBroker>, StoreError> {
        Ok(self.brokers.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn get_offering(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceOffering>, StoreError> {
        Ok(self.offerings.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn get_plan(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServicePlan>, StoreError> {
        Ok(self.plans.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CFServiceInstance>, StoreError> {
        Ok(self.instances.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn get_space(&self, namespace: &str) -> Result<Option<SpaceInfo>, StoreError> {
        Ok(self.spaces.lock().unwrap().get(namespace).cloned())
    }
}

#[async_trait]
impl CatalogWriter for FakeAssetStore {
    async fn apply_offering(&self, offering: &CFServiceOffering) -> Result<(), StoreError> {
        self.put_offering(offering.clone());
        Ok(())
    }

    async fn apply_plan(&self, plan: &CFServicePlan) -> Result<(), StoreError> {
        self.put_plan(plan.clone());
        Ok(())
    }
}

/// Secret store that records every write
#[derive(Default)]
pub(crate) struct FakeSecretStore {
    secrets: Mutex<BTreeMap<Key, SecretData>>,
    writes: Mutex<Vec<DesiredSecret>>,
}

impl FakeSecretStore {
    pub fn put(&self, namespace: &str, name: &str, entries: &[(&str, &str)]) {
        let data = entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.as_bytes().to_vec()))
            .collect();
        self.secrets.lock().unwrap().insert(key(namespace, name), data);
    }

    /// Latest write to the named secret
    pub fn written(&self, namespace: &str, name: &str) -> Option<DesiredSecret> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.namespace == namespace && s.name == name)
            .cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError> {
        Ok(self.secrets.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn create_or_update(&self, secret: DesiredSecret) -> Result<(), StoreError> {
        self.secrets
            .lock()
            .unwrap()
            .insert(key(&secret.namespace, &secret.name), secret.data.clone());
        self.writes.lock().unwrap().push(secret);
        Ok(())
    }
}

/// One recorded broker call
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    GetCatalog,
    Provision(ProvisionPayload),
    Deprovision(DeprovisionPayload),
    LastOperation(LastOperationRequest),
    Bind(BindPayload),
    Unbind(BindingRef),
    GetBinding(BindingRef),
}

type Script<T> = Mutex<VecDeque<Result<T, BrokerError>>>;

/// Broker client answering from per-operation queues
///
/// An operation with an empty queue answers 500, which reconcilers treat as
/// recoverable.
#[derive(Default)]
pub(crate) struct ScriptedBrokerClient {
    catalog: Script<Catalog>,
    provision: Script<OperationResponse>,
    deprovision: Script<OperationResponse>,
    last_operation: Script<LastOperationResponse>,
    bind: Script<BindResponse>,
    unbind: Script<OperationResponse>,
    get_binding: Script<GetBindingResponse>,
    calls: Mutex<Vec<Call>>,
}

fn next<T>(script: &Script<T>, operation: Operation) -> Result<T, BrokerError> {
    script.lock().unwrap().pop_front().unwrap_or_else(|| {
        Err(BrokerError::UnexpectedStatus {
            operation,
            status: 500,
            body: "no scripted response".into(),
        })
    })
}

impl ScriptedBrokerClient {
    pub fn on_catalog(&self, result: Result<Catalog, BrokerError>) -> &Self {
        self.catalog.lock().unwrap().push_back(result);
        self
    }

    pub fn on_provision(&self, result: Result<OperationResponse, BrokerError>) -> &Self {
        self.provision.lock().unwrap().push_back(result);
        self
    }

    pub fn on_deprovision(&self, result: Result<OperationResponse, BrokerError>) -> &Self {
        self.deprovision.lock().unwrap().push_back(result);
        self
    }

    pub fn on_last_operation(&self, result: Result<LastOperationResponse, BrokerError>) -> &Self {
        self.last_operation.lock().unwrap().push_back(result);
        self
    }

    pub fn on_bind(&self, result: Result<BindResponse, BrokerError>) -> &Self {
        self.bind.lock().unwrap().push_back(result);
        self
    }

    pub fn on_unbind(&self, result: Result<OperationResponse, BrokerError>) -> &Self {
        self.unbind.lock().unwrap().push_back(result);
        self
    }

    pub fn on_get_binding(&self, result: Result<GetBindingResponse, BrokerError>) -> &Self {
        self.get_binding.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// Operation tokens sent on every last-operation poll, in order
    pub fn polled_tokens(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::LastOperation(req) => Some(req.operation.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrokerClient for ScriptedBrokerClient {
    async fn get_catalog(&self) -> Result<Catalog, BrokerError> {
        self.record(Call::GetCatalog);
        next(&self.catalog, Operation::GetCatalog)
    }

    async fn provision(&self, payload: &ProvisionPayload) -> Result<OperationResponse, BrokerError> {
        self.record(Call::Provision(payload.clone()));
        next(&self.provision, Operation::Provision)
    }

    async fn deprovision(
        &self,
        payload: &DeprovisionPayload,
    ) -> Result<OperationResponse, BrokerError> {
        self.record(Call::Deprovision(payload.clone()));
        next(&self.deprovision, Operation::Deprovision)
    }

    async fn get_last_operation(
        &self,
        request: &LastOperationRequest,
    ) -> Result<LastOperationResponse, BrokerError> {
        self.record(Call::LastOperation(request.clone()));
        next(&self.last_operation, Operation::GetInstanceLastOperation)
    }

    async fn bind(&self, payload: &BindPayload) -> Result<BindResponse, BrokerError> {
        self.record(Call::Bind(payload.clone()));
        next(&self.bind, Operation::Bind)
    }

    async fn unbind(&self, binding: &BindingRef) -> Result<OperationResponse, BrokerError> {
        self.record(Call::Unbind(binding.clone()));
        next(&self.unbind, Operation::Unbind)
    }

    async fn get_binding(&self, binding: &BindingRef) -> Result<GetBindingResponse, BrokerError> {
        self.record(Call::GetBinding(binding.clone()));
        next(&self.get_binding, Operation::GetBinding)
    }
}

/// Hands out one shared [`ScriptedBrokerClient`]
#[derive(Default)]
pub(crate) struct FakeClientFactory {
    pub client: Arc<ScriptedBrokerClient>,
    missing_secret: AtomicBool,
}

impl FakeClientFactory {
    pub fn fail_with_missing_secret(&self) {
        self.missing_secret.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerClientFactory for FakeClientFactory {
    async fn create_client(
        &self,
        broker: &CFServiceBroker,
    ) -> Result<Arc<dyn BrokerClient>, ClientCreationError> {
        if self.missing_secret.load(Ordering::SeqCst) {
            return Err(ClientCreationError::SecretNotFound {
                namespace: broker.namespace().unwrap_or_default(),
                name: broker.spec.credentials.name.clone(),
            });
        }
        Ok(self.client.clone())
    }
}

pub(crate) fn accepted(operation: &str) -> Result<OperationResponse, BrokerError> {
    Ok(OperationResponse {
        operation: Some(operation.to_owned()),
        is_async: true,
    })
}

pub(crate) fn completed() -> Result<OperationResponse, BrokerError> {
    Ok(OperationResponse::default())
}

pub(crate) fn last_operation(state: OperationState) -> Result<LastOperationResponse, BrokerError> {
    Ok(LastOperationResponse {
        state,
        description: None,
    })
}

pub(crate) fn broker_status(operation: Operation, status: u16) -> BrokerError {
    BrokerError::unexpected_status(operation, status, b"{\"error\":\"scripted\"}")
}

pub(crate) mod fixtures {
    use crate::crd::{
        BindingType, CFServiceBinding, CFServiceBindingSpec, CFServiceBroker,
        CFServiceBrokerSpec, CFServiceInstance, CFServiceInstanceSpec, CFServiceOffering,
        CFServiceOfferingSpec, CFServicePlan, CFServicePlanSpec, InstanceKind, LocalObjectRef,
        MaintenanceInfo, OfferingCatalog, PlanCatalog, PlanVisibility, VisibilityType,
    };
    use kube::Resource;

    pub const ROOT_NAMESPACE: &str = "cf";
    pub const SPACE_NAMESPACE: &str = "cf-space-dev";
    pub const ORG_GUID: &str = "org-guid-1";
    pub const SPACE_GUID: &str = "space-guid-1";

    pub const BROKER_NAME: &str = "sample-broker";
    pub const BROKER_URL: &str = "http://broker.test:8080";
    pub const BROKER_SECRET: &str = "sample-broker-credentials";
    pub const OFFERING_NAME: &str = "offering-1";
    pub const PLAN_NAME: &str = "plan-1";
    pub const SERVICE_ID: &str = "edfd6e50-aa59-4688-b5bf-b21e2ab27cdb";
    pub const PLAN_ID: &str = "ebf1c1df-fefb-479b-9231-ddf700a37b58";
    pub const MAINTENANCE_VERSION: &str = "1.2.3";
    pub const APP_GUID: &str = "app-guid-1";

    fn with_meta<K: Resource>(mut obj: K, namespace: &str, name: &str) -> K {
        let meta = obj.meta_mut();
        meta.namespace = Some(namespace.to_owned());
        meta.name = Some(name.to_owned());
        meta.uid = Some(format!("uid-{name}"));
        meta.generation = Some(1);
        obj
    }

    pub fn broker() -> CFServiceBroker {
        with_meta(
            CFServiceBroker::new(
                BROKER_NAME,
                CFServiceBrokerSpec {
                    name: BROKER_NAME.into(),
                    url: BROKER_URL.into(),
                    credentials: LocalObjectRef::new(BROKER_SECRET),
                },
            ),
            ROOT_NAMESPACE,
            BROKER_NAME,
        )
    }

    pub fn offering() -> CFServiceOffering {
        with_meta(
            CFServiceOffering::new(
                OFFERING_NAME,
                CFServiceOfferingSpec {
                    name: "sample-service".into(),
                    description: "A sample service".into(),
                    tags: vec![],
                    requires: vec![],
                    broker_ref: LocalObjectRef::new(BROKER_NAME),
                    broker_catalog: OfferingCatalog {
                        id: SERVICE_ID.into(),
                        bindable: true,
                        ..OfferingCatalog::default()
                    },
                },
            ),
            ROOT_NAMESPACE,
            OFFERING_NAME,
        )
    }

    /// Public plan at maintenance version [`MAINTENANCE_VERSION`]
    pub fn plan() -> CFServicePlan {
        with_meta(
            CFServicePlan::new(
                PLAN_NAME,
                CFServicePlanSpec {
                    name: "sample".into(),
                    description: String::new(),
                    free: true,
                    bindable: None,
                    offering_ref: LocalObjectRef::new(OFFERING_NAME),
                    broker_catalog: PlanCatalog { id: PLAN_ID.into() },
                    visibility: PlanVisibility {
                        r#type: VisibilityType::Public,
                        organizations: vec![],
                    },
                    maintenance_info: Some(MaintenanceInfo {
                        version: MAINTENANCE_VERSION.into(),
                        description: None,
                    }),
                },
            ),
            ROOT_NAMESPACE,
            PLAN_NAME,
        )
    }

    pub fn plan_with_visibility(r#type: VisibilityType, organizations: &[&str]) -> CFServicePlan {
        let mut plan = plan();
        plan.spec.visibility = PlanVisibility {
            r#type,
            organizations: organizations.iter().map(ToString::to_string).collect(),
        };
        plan
    }

    pub fn managed_instance(name: &str) -> CFServiceInstance {
        with_meta(
            CFServiceInstance::new(
                name,
                CFServiceInstanceSpec {
                    display_name: Some(format!("{name}-display")),
                    kind: InstanceKind::Managed,
                    plan_ref: Some(LocalObjectRef::new(PLAN_NAME)),
                    service_label: None,
                    parameters_ref: None,
                    credentials_ref: None,
                    tags: vec![],
                },
            ),
            SPACE_NAMESPACE,
            name,
        )
    }

    pub fn user_provided_instance(name: &str, credentials_secret: &str) -> CFServiceInstance {
        let mut instance = managed_instance(name);
        instance.spec.kind = InstanceKind::UserProvided;
        instance.spec.plan_ref = None;
        instance.spec.credentials_ref = Some(LocalObjectRef::new(credentials_secret));
        instance
    }

    pub fn binding(name: &str, instance: &str) -> CFServiceBinding {
        with_meta(
            CFServiceBinding::new(
                name,
                CFServiceBindingSpec {
                    display_name: None,
                    r#type: BindingType::App,
                    service_instance_ref: LocalObjectRef::new(instance),
                    app_ref: Some(LocalObjectRef::new(APP_GUID)),
                    parameters_ref: None,
                },
            ),
            SPACE_NAMESPACE,
            name,
        )
    }

    /// Mark the object as deleted with the given finalizers still present
    pub fn deleting<K: Resource>(mut obj: K, finalizers: &[&str]) -> K {
        let meta = obj.meta_mut();
        meta.deletion_timestamp = Some(serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap());
        meta.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
        obj
    }
}
