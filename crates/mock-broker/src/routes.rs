//! # Routes
//!
//! One handler per OSBAPI operation. Every handler first records the request,
//! then checks Basic credentials and the API version header, then returns a
//! scripted response if one is queued, and only then runs the default behavior.

use crate::catalog::{binding_credentials, is_known_plan, sample_catalog};
use crate::errors::{error_codes, osbapi_error_response};
use crate::state::{MockBroker, RecordedRequest};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use paths::osbapi::{query, routes, API_VERSION_HEADER};
use paths::Operation;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

type QueryMap = HashMap<String, String>;

/// Router serving every OSBAPI route against `broker`
pub fn router(broker: MockBroker) -> Router {
    Router::new()
        .route(routes::CATALOG, get(get_catalog))
        .route(routes::INSTANCE, put(provision).delete(deprovision))
        .route(routes::INSTANCE_LAST_OPERATION, get(instance_last_operation))
        .route(routes::BINDING, put(bind).delete(unbind).get(get_binding))
        .route(routes::BINDING_LAST_OPERATION, get(binding_last_operation))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(broker)
}

/// Record the request and apply the checks every route shares
///
/// Returns the response to send when the default behavior must not run.
async fn admit(
    broker: &MockBroker,
    operation: Operation,
    uri: &Uri,
    query: &QueryMap,
    headers: &HeaderMap,
    body: &Bytes,
) -> Option<Response> {
    broker
        .record(RecordedRequest {
            operation,
            method: operation.method(),
            path: uri.path().to_owned(),
            query: query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            api_version: header_str(headers, API_VERSION_HEADER).map(str::to_owned),
            body: serde_json::from_slice(body).ok(),
        })
        .await;
    info!("  {} {}", operation.method(), uri);

    if !broker.is_authorized(header_str(headers, header::AUTHORIZATION.as_str())) {
        return Some(osbapi_error_response(
            StatusCode::UNAUTHORIZED,
            error_codes::UNAUTHORIZED,
            "missing or invalid Basic credentials".to_owned(),
        ));
    }

    if header_str(headers, API_VERSION_HEADER).is_none() {
        return Some(osbapi_error_response(
            StatusCode::PRECONDITION_FAILED,
            error_codes::PRECONDITION_FAILED,
            format!("{API_VERSION_HEADER} header is required"),
        ));
    }

    let scripted = broker.next_script(operation).await?;
    debug!(status = scripted.status, "  returning scripted response");
    let status = StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, Json(scripted.body)).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn accepts_incomplete(params: &QueryMap) -> bool {
    params.get(query::ACCEPTS_INCOMPLETE).is_some_and(|v| v == "true")
}

/// `service_id` and `plan_id` from a request body, if they name the sample plan
fn known_plan_in(body: &Bytes) -> Result<Value, Response> {
    let request: Value = serde_json::from_slice(body).map_err(|e| {
        osbapi_error_response(
            StatusCode::BAD_REQUEST,
            error_codes::BAD_REQUEST,
            format!("invalid JSON body: {e}"),
        )
    })?;
    let service_id = request["service_id"].as_str().unwrap_or_default();
    let plan_id = request["plan_id"].as_str().unwrap_or_default();
    if !is_known_plan(service_id, plan_id) {
        return Err(osbapi_error_response(
            StatusCode::BAD_REQUEST,
            error_codes::BAD_REQUEST,
            format!("unknown service_id/plan_id {service_id}/{plan_id}"),
        ));
    }
    Ok(request)
}

fn require_ids(params: &QueryMap) -> Option<Response> {
    let missing: Vec<&str> = [query::SERVICE_ID, query::PLAN_ID]
        .into_iter()
        .filter(|name| !params.contains_key(*name))
        .collect();
    (!missing.is_empty()).then(|| {
        osbapi_error_response(
            StatusCode::BAD_REQUEST,
            error_codes::BAD_REQUEST,
            format!("missing query parameters: {}", missing.join(", ")),
        )
    })
}

fn gone() -> Response {
    (StatusCode::GONE, Json(json!({}))).into_response()
}

async fn get_catalog(
    State(broker): State<MockBroker>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::GetCatalog, &uri, &query, &headers, &body).await {
        return response;
    }
    Json(sample_catalog()).into_response()
}

async fn provision(
    State(broker): State<MockBroker>,
    Path(instance_id): Path<String>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::Provision, &uri, &query, &headers, &body).await {
        return response;
    }
    let request = match known_plan_in(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if !broker.insert_instance(&instance_id, request).await {
        return (StatusCode::OK, Json(json!({}))).into_response();
    }
    if accepts_incomplete(&query) {
        let operation = broker.begin_provision(&instance_id).await;
        return (StatusCode::ACCEPTED, Json(json!({ "operation": operation }))).into_response();
    }
    (StatusCode::CREATED, Json(json!({}))).into_response()
}

async fn deprovision(
    State(broker): State<MockBroker>,
    Path(instance_id): Path<String>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::Deprovision, &uri, &query, &headers, &body).await {
        return response;
    }
    if let Some(response) = require_ids(&query) {
        return response;
    }
    if !broker.has_instance(&instance_id).await {
        return gone();
    }

    if accepts_incomplete(&query) {
        let operation = broker.begin_deprovision(&instance_id).await;
        return (StatusCode::ACCEPTED, Json(json!({ "operation": operation }))).into_response();
    }
    broker.remove_instance(&instance_id).await;
    (StatusCode::OK, Json(json!({}))).into_response()
}

async fn instance_last_operation(
    State(broker): State<MockBroker>,
    Path(instance_id): Path<String>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(
        &broker,
        Operation::GetInstanceLastOperation,
        &uri,
        &query,
        &headers,
        &body,
    )
    .await
    {
        return response;
    }
    match broker.poll_instance(&instance_id).await {
        Some(state) => Json(json!({ "state": state })).into_response(),
        None => gone(),
    }
}

async fn bind(
    State(broker): State<MockBroker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::Bind, &uri, &query, &headers, &body).await {
        return response;
    }
    if let Err(response) = known_plan_in(&body) {
        return response;
    }
    if !broker.has_instance(&instance_id).await {
        return osbapi_error_response(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("service instance {instance_id} does not exist"),
        );
    }

    let credentials = binding_credentials(&instance_id, &binding_id);
    let status = if broker
        .insert_binding(&instance_id, &binding_id, credentials.clone())
        .await
    {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(json!({ "credentials": credentials }))).into_response()
}

async fn unbind(
    State(broker): State<MockBroker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::Unbind, &uri, &query, &headers, &body).await {
        return response;
    }
    if let Some(response) = require_ids(&query) {
        return response;
    }
    if broker.remove_binding(&instance_id, &binding_id).await {
        (StatusCode::OK, Json(json!({}))).into_response()
    } else {
        gone()
    }
}

async fn get_binding(
    State(broker): State<MockBroker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(&broker, Operation::GetBinding, &uri, &query, &headers, &body).await {
        return response;
    }
    match broker.binding(&instance_id, &binding_id).await {
        Some(credentials) => Json(json!({ "credentials": credentials })).into_response(),
        None => osbapi_error_response(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("service binding {binding_id} does not exist"),
        ),
    }
}

async fn binding_last_operation(
    State(broker): State<MockBroker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<QueryMap>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(response) = admit(
        &broker,
        Operation::GetBindingLastOperation,
        &uri,
        &query,
        &headers,
        &body,
    )
    .await
    {
        return response;
    }
    if broker.binding(&instance_id, &binding_id).await.is_some() {
        Json(json!({ "state": "succeeded" })).into_response()
    } else {
        gone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PLAN_ID, SERVICE_ID};
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn server(broker: &MockBroker) -> TestServer {
        TestServer::new(router(broker.clone())).unwrap()
    }

    fn auth(broker: &MockBroker) -> (HeaderName, HeaderValue) {
        let encoded = STANDARD.encode(format!("{}:{}", broker.username(), broker.password()));
        (
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        )
    }

    fn version() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-broker-api-version"),
            HeaderValue::from_static("2.17"),
        )
    }

    fn provision_body() -> Value {
        json!({
            "service_id": SERVICE_ID,
            "plan_id": PLAN_ID,
            "organization_guid": "org",
            "space_guid": "space",
        })
    }

    #[tokio::test]
    async fn catalog_requires_credentials() {
        let broker = MockBroker::default();
        let server = server(&broker);
        let (version_name, version_value) = version();

        let response = server
            .get("/v2/catalog")
            .add_header(version_name, version_value)
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(broker.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn catalog_requires_api_version() {
        let broker = MockBroker::default();
        let (auth_name, auth_value) = auth(&broker);

        server(&broker)
            .get("/v2/catalog")
            .add_header(auth_name, auth_value)
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn catalog_lists_sample_service() {
        let broker = MockBroker::default();
        let (auth_name, auth_value) = auth(&broker);
        let (version_name, version_value) = version();

        let response = server(&broker)
            .get("/v2/catalog")
            .add_header(auth_name, auth_value)
            .add_header(version_name, version_value)
            .await;
        response.assert_status_ok();
        let catalog: Value = response.json();
        assert_eq!(catalog["services"][0]["plans"][0]["maintenance_info"]["version"], "1.2.3");
    }

    #[tokio::test]
    async fn async_provision_then_two_polls() {
        let broker = MockBroker::default();
        let server = server(&broker);
        let (auth_name, auth_value) = auth(&broker);
        let (version_name, version_value) = version();

        let response = server
            .put("/v2/service_instances/i-1")
            .add_query_param("accepts_incomplete", "true")
            .add_header(auth_name.clone(), auth_value.clone())
            .add_header(version_name.clone(), version_value.clone())
            .json(&provision_body())
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(response.json::<Value>()["operation"], "provision-i-1");

        let mut states = Vec::new();
        for _ in 0..2 {
            let poll = server
                .get("/v2/service_instances/i-1/last_operation")
                .add_query_param("operation", "provision-i-1")
                .add_header(auth_name.clone(), auth_value.clone())
                .add_header(version_name.clone(), version_value.clone())
                .await;
            states.push(poll.json::<Value>()["state"].clone());
        }
        assert_eq!(states, vec![json!("in progress"), json!("succeeded")]);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let broker = MockBroker::default();
        let (auth_name, auth_value) = auth(&broker);
        let (version_name, version_value) = version();

        server(&broker)
            .put("/v2/service_instances/i-1")
            .add_header(auth_name, auth_value)
            .add_header(version_name, version_value)
            .json(&json!({ "service_id": SERVICE_ID, "plan_id": "nope" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        assert!(!broker.has_instance("i-1").await);
    }

    #[tokio::test]
    async fn scripted_response_wins_once() {
        let broker = MockBroker::default();
        broker
            .script(Operation::GetCatalog, 503, json!({ "description": "down" }))
            .await;
        let server = server(&broker);
        let (auth_name, auth_value) = auth(&broker);
        let (version_name, version_value) = version();

        server
            .get("/v2/catalog")
            .add_header(auth_name.clone(), auth_value.clone())
            .add_header(version_name.clone(), version_value.clone())
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        server
            .get("/v2/catalog")
            .add_header(auth_name, auth_value)
            .add_header(version_name, version_value)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn unbind_of_unknown_binding_is_gone() {
        let broker = MockBroker::default();
        let (auth_name, auth_value) = auth(&broker);
        let (version_name, version_value) = version();

        server(&broker)
            .delete("/v2/service_instances/i-1/service_bindings/b-1")
            .add_query_param("service_id", SERVICE_ID)
            .add_query_param("plan_id", PLAN_ID)
            .add_header(auth_name, auth_value)
            .add_header(version_name, version_value)
            .await
            .assert_status(StatusCode::GONE);
    }
}
