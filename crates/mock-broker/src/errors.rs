//! OSBAPI error response formatting
//!
//! Format: `{"error": "AsyncRequired", "description": "..."}`
//! Reference: <https://github.com/openservicebrokerapi/servicebroker/blob/v2.17/spec.md#service-broker-errors>

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

pub fn osbapi_error_response(status: StatusCode, error: &str, description: String) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "description": description
        })),
    )
        .into_response()
}

/// OSBAPI error codes
pub mod error_codes {
    pub const ASYNC_REQUIRED: &str = "AsyncRequired";
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const BAD_REQUEST: &str = "BadRequest";
    pub const PRECONDITION_FAILED: &str = "PreconditionFailed";
    pub const NOT_FOUND: &str = "NotFound";
}
