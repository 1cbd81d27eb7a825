//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "service-broker-controller";

/// Namespace holding brokers, offerings and plans
pub const DEFAULT_ROOT_NAMESPACE: &str = "cf";

/// Finalizer guarding managed service instances until the broker deprovisions them
pub const MANAGED_INSTANCE_FINALIZER: &str = "services.microscaler.io/managed-instance";

/// Finalizer guarding managed service bindings until the broker unbinds them
pub const MANAGED_BINDING_FINALIZER: &str = "services.microscaler.io/managed-binding";

/// Annotation that lets an operator finalize deletion without contacting the broker
pub const PURGE_ANNOTATION: &str = "services.microscaler.io/purge";

/// Namespace labels carrying the Cloud Foundry organization and space GUIDs
pub const ORG_GUID_LABEL: &str = "cloudfoundry.org/org-guid";
pub const SPACE_GUID_LABEL: &str = "cloudfoundry.org/space-guid";

/// Suffix of the normalized (servicebinding.io) secret created for a binding
pub const BINDING_SECRET_SUFFIX: &str = "-sbio";

// Broker client
pub const DEFAULT_BROKER_REQUEST_TIMEOUT_SECS: u64 = 30;

// Reconciliation
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ASYNC_POLL_INTERVAL_SECS: u64 = 5;
/// Requeue delay while a referenced secret does not exist yet
pub const DEFAULT_MISSING_SECRET_REQUEUE_SECS: u64 = 2;
/// Requeue delay after an optimistic-concurrency conflict on persist
pub const DEFAULT_CONFLICT_REQUEUE_MS: u64 = 500;

// Error backoff (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

// HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 5000;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
