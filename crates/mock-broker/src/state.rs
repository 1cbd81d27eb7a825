//! In-memory broker state
//!
//! Instances, bindings and in-flight asynchronous operations, plus the scripted
//! responses and request log tests inspect.

use crate::{DEFAULT_PASSWORD, DEFAULT_USERNAME};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use paths::Operation;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Polls after which an asynchronous operation reports `succeeded`
pub const POLLS_TO_COMPLETE: u32 = 2;

/// Response returned once for the next request of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: Value,
}

/// A request as the broker received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub operation: Operation,
    pub method: &'static str,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// `X-Broker-API-Version` header
    pub api_version: Option<String>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Provision,
    Deprovision,
}

#[derive(Debug, Clone)]
struct PendingOperation {
    kind: PendingKind,
    polls: u32,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<Operation, VecDeque<ScriptedResponse>>,
    requests: Vec<RecordedRequest>,
    /// Instance ID to provision request body
    instances: HashMap<String, Value>,
    /// (instance ID, binding ID) to credentials
    bindings: HashMap<(String, String), Value>,
    /// Instance ID to its in-flight operation
    pending: HashMap<String, PendingOperation>,
}

/// Shared broker handle; clones see the same state
#[derive(Debug, Clone)]
pub struct MockBroker {
    username: String,
    password: String,
    inner: Arc<RwLock<Inner>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new(DEFAULT_USERNAME, DEFAULT_PASSWORD)
    }
}

impl MockBroker {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether an `Authorization` header value carries this broker's credentials
    #[must_use]
    pub fn is_authorized(&self, authorization: Option<&str>) -> bool {
        let Some(encoded) = authorization.and_then(|value| value.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let expected = format!("{}:{}", self.username, self.password);
        decoded == expected.as_bytes()
    }

    /// Queue a response for the next request of `operation`
    pub async fn script(&self, operation: Operation, status: u16, body: Value) {
        self.inner
            .write()
            .await
            .scripts
            .entry(operation)
            .or_default()
            .push_back(ScriptedResponse { status, body });
    }

    pub(crate) async fn next_script(&self, operation: Operation) -> Option<ScriptedResponse> {
        self.inner
            .write()
            .await
            .scripts
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
    }

    pub(crate) async fn record(&self, request: RecordedRequest) {
        self.inner.write().await.requests.push(request);
    }

    /// Every request received so far, oldest first
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.read().await.requests.clone()
    }

    /// Requests of one operation, oldest first
    pub async fn requests_for(&self, operation: Operation) -> Vec<RecordedRequest> {
        self.inner
            .read()
            .await
            .requests
            .iter()
            .filter(|request| request.operation == operation)
            .cloned()
            .collect()
    }

    pub async fn has_instance(&self, instance_id: &str) -> bool {
        self.inner.read().await.instances.contains_key(instance_id)
    }

    pub async fn has_binding(&self, instance_id: &str, binding_id: &str) -> bool {
        self.inner
            .read()
            .await
            .bindings
            .contains_key(&(instance_id.to_owned(), binding_id.to_owned()))
    }

    /// Store an instance; `false` if it already existed
    pub(crate) async fn insert_instance(&self, instance_id: &str, request: Value) -> bool {
        let mut inner = self.inner.write().await;
        if inner.instances.contains_key(instance_id) {
            return false;
        }
        inner.instances.insert(instance_id.to_owned(), request);
        true
    }

    /// Remove an instance and its bindings; `false` if it did not exist
    pub(crate) async fn remove_instance(&self, instance_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.pending.remove(instance_id);
        inner.bindings.retain(|(instance, _), _| instance != instance_id);
        inner.instances.remove(instance_id).is_some()
    }

    /// Start an asynchronous provision and return its operation token
    pub(crate) async fn begin_provision(&self, instance_id: &str) -> String {
        self.begin(instance_id, PendingKind::Provision).await
    }

    /// Start an asynchronous deprovision and return its operation token
    pub(crate) async fn begin_deprovision(&self, instance_id: &str) -> String {
        self.begin(instance_id, PendingKind::Deprovision).await
    }

    async fn begin(&self, instance_id: &str, kind: PendingKind) -> String {
        self.inner
            .write()
            .await
            .pending
            .insert(instance_id.to_owned(), PendingOperation { kind, polls: 0 });
        let prefix = match kind {
            PendingKind::Provision => "provision",
            PendingKind::Deprovision => "deprovision",
        };
        format!("{prefix}-{instance_id}")
    }

    /// Advance the instance's in-flight operation by one poll
    ///
    /// Returns the OSBAPI state, or `None` when the instance is unknown (410).
    pub(crate) async fn poll_instance(&self, instance_id: &str) -> Option<&'static str> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(pending) = inner.pending.get_mut(instance_id) else {
            return inner
                .instances
                .contains_key(instance_id)
                .then_some("succeeded");
        };

        pending.polls += 1;
        if pending.polls < POLLS_TO_COMPLETE {
            return Some("in progress");
        }

        let kind = pending.kind;
        inner.pending.remove(instance_id);
        if kind == PendingKind::Deprovision {
            inner.instances.remove(instance_id);
            inner.bindings.retain(|(instance, _), _| instance != instance_id);
        }
        Some("succeeded")
    }

    /// Store a binding's credentials; `false` if it already existed
    pub(crate) async fn insert_binding(&self, instance_id: &str, binding_id: &str, credentials: Value) -> bool {
        let key = (instance_id.to_owned(), binding_id.to_owned());
        let mut inner = self.inner.write().await;
        if inner.bindings.contains_key(&key) {
            return false;
        }
        inner.bindings.insert(key, credentials);
        true
    }

    pub(crate) async fn binding(&self, instance_id: &str, binding_id: &str) -> Option<Value> {
        self.inner
            .read()
            .await
            .bindings
            .get(&(instance_id.to_owned(), binding_id.to_owned()))
            .cloned()
    }

    pub(crate) async fn remove_binding(&self, instance_id: &str, binding_id: &str) -> bool {
        self.inner
            .write()
            .await
            .bindings
            .remove(&(instance_id.to_owned(), binding_id.to_owned()))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_credentials_are_checked() {
        let broker = MockBroker::new("user", "pass");
        let header = format!("Basic {}", STANDARD.encode("user:pass"));
        assert!(broker.is_authorized(Some(&header)));

        let wrong = format!("Basic {}", STANDARD.encode("user:other"));
        assert!(!broker.is_authorized(Some(&wrong)));
        assert!(!broker.is_authorized(Some("Bearer token")));
        assert!(!broker.is_authorized(None));
    }

    #[tokio::test]
    async fn async_deprovision_completes_on_second_poll() {
        let broker = MockBroker::default();
        broker.insert_instance("i-1", json!({})).await;
        broker.insert_binding("i-1", "b-1", json!({})).await;
        let token = broker.begin_deprovision("i-1").await;
        assert_eq!(token, "deprovision-i-1");

        assert_eq!(broker.poll_instance("i-1").await, Some("in progress"));
        assert_eq!(broker.poll_instance("i-1").await, Some("succeeded"));
        assert!(!broker.has_instance("i-1").await);
        assert!(!broker.has_binding("i-1", "b-1").await);
        assert_eq!(broker.poll_instance("i-1").await, None);
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order() {
        let broker = MockBroker::default();
        broker.script(Operation::Bind, 409, json!({})).await;
        broker.script(Operation::Bind, 500, json!({})).await;

        assert_eq!(broker.next_script(Operation::Bind).await.map(|s| s.status), Some(409));
        assert_eq!(broker.next_script(Operation::Bind).await.map(|s| s.status), Some(500));
        assert_eq!(broker.next_script(Operation::Bind).await, None);
        assert_eq!(broker.next_script(Operation::Unbind).await, None);
    }
}
