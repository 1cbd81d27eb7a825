//! # OSBAPI Paths
//!
//! Wire-level constants of the Open Service Broker API v2.

/// Protocol version sent on every request
pub const API_VERSION: &str = "2.17";

/// Header carrying the protocol version
pub const API_VERSION_HEADER: &str = "X-Broker-API-Version";

/// Query parameter names
pub mod query {
    pub const ACCEPTS_INCOMPLETE: &str = "accepts_incomplete";
    pub const SERVICE_ID: &str = "service_id";
    pub const PLAN_ID: &str = "plan_id";
    pub const OPERATION: &str = "operation";
}

/// Axum route templates
///
/// Path parameters use axum 0.8 `{name}` syntax.
pub mod routes {
    pub const CATALOG: &str = "/v2/catalog";
    pub const INSTANCE: &str = "/v2/service_instances/{instance_id}";
    pub const INSTANCE_LAST_OPERATION: &str = "/v2/service_instances/{instance_id}/last_operation";
    pub const BINDING: &str = "/v2/service_instances/{instance_id}/service_bindings/{binding_id}";
    pub const BINDING_LAST_OPERATION: &str =
        "/v2/service_instances/{instance_id}/service_bindings/{binding_id}/last_operation";
}

/// Broker operations, one per path shape and verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetCatalog,
    Provision,
    Deprovision,
    GetInstanceLastOperation,
    Bind,
    Unbind,
    GetBinding,
    GetBindingLastOperation,
}

impl Operation {
    /// Stable operation name, used for metrics labels and tracing spans
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetCatalog => "get_catalog",
            Self::Provision => "provision",
            Self::Deprovision => "deprovision",
            Self::GetInstanceLastOperation => "get_instance_last_operation",
            Self::Bind => "bind",
            Self::Unbind => "unbind",
            Self::GetBinding => "get_binding",
            Self::GetBindingLastOperation => "get_binding_last_operation",
        }
    }

    /// Route template this operation is served on
    #[must_use]
    pub fn route(self) -> &'static str {
        match self {
            Self::GetCatalog => routes::CATALOG,
            Self::Provision | Self::Deprovision => routes::INSTANCE,
            Self::GetInstanceLastOperation => routes::INSTANCE_LAST_OPERATION,
            Self::Bind | Self::Unbind | Self::GetBinding => routes::BINDING,
            Self::GetBindingLastOperation => routes::BINDING_LAST_OPERATION,
        }
    }

    /// HTTP method name
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Provision | Self::Bind => "PUT",
            Self::Deprovision | Self::Unbind => "DELETE",
            Self::GetCatalog
            | Self::GetInstanceLastOperation
            | Self::GetBinding
            | Self::GetBindingLastOperation => "GET",
        }
    }

    /// Write operations always offer `accepts_incomplete=true`
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::Provision | Self::Deprovision | Self::Bind | Self::Unbind
        )
    }

    #[must_use]
    pub fn needs_binding_id(self) -> bool {
        matches!(
            self,
            Self::Bind | Self::Unbind | Self::GetBinding | Self::GetBindingLastOperation
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
