//! # Broker Client
//!
//! `BrokerClient` is the seam between reconcilers and brokers. The reqwest
//! implementation speaks OSBAPI v2.17 over HTTP with Basic auth.
//!
//! Every call issues exactly one HTTP request. Write operations always offer
//! `accepts_incomplete=true`; the client never requires a synchronous broker.
//! Cancellation is by drop: dropping the returned future aborts the request.

use super::error::BrokerError;
use super::types::{
    BindPayload, BindResponse, BindingRef, Catalog, DeprovisionPayload, GetBindingResponse,
    LastOperationRequest, LastOperationResponse, OperationBody, OperationResponse,
    ProvisionPayload,
};
use crate::observability::metrics;
use async_trait::async_trait;
use paths::osbapi::{query, API_VERSION, API_VERSION_HEADER};
use paths::{Operation, PathBuilder};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};

/// One method per OSBAPI verb
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// `GET /v2/catalog`
    async fn get_catalog(&self) -> Result<Catalog, BrokerError>;

    /// `PUT /v2/service_instances/{id}`: 200/201 complete, 202 async
    async fn provision(&self, payload: &ProvisionPayload)
        -> Result<OperationResponse, BrokerError>;

    /// `DELETE /v2/service_instances/{id}`: 200 complete, 202 async, 410 Gone
    async fn deprovision(
        &self,
        payload: &DeprovisionPayload,
    ) -> Result<OperationResponse, BrokerError>;

    /// `GET .../last_operation` for an instance or a binding: 410 Gone
    async fn get_last_operation(
        &self,
        request: &LastOperationRequest,
    ) -> Result<LastOperationResponse, BrokerError>;

    /// `PUT .../service_bindings/{id}`: 200/201 complete, 202 async, 409 Conflict
    async fn bind(&self, payload: &BindPayload) -> Result<BindResponse, BrokerError>;

    /// `DELETE .../service_bindings/{id}`: 200 complete, 202 async, 410 Gone
    async fn unbind(&self, binding: &BindingRef) -> Result<OperationResponse, BrokerError>;

    /// `GET .../service_bindings/{id}`: final credentials of a binding
    async fn get_binding(&self, binding: &BindingRef) -> Result<GetBindingResponse, BrokerError>;
}

/// Broker endpoint and Basic credentials
#[derive(Clone)]
pub struct BrokerConnection {
    pub url: String,
    pub username: String,
    password: String,
}

impl BrokerConnection {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// reqwest-backed OSBAPI client
#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    broker_name: String,
    connection: BrokerConnection,
    http: reqwest::Client,
}

struct RawResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl HttpBrokerClient {
    pub fn new(broker_name: impl Into<String>, connection: BrokerConnection, http: reqwest::Client) -> Self {
        Self {
            broker_name: broker_name.into(),
            connection,
            http,
        }
    }

    /// Build the shared HTTP client used for all brokers
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_http_client(
        request_timeout: Duration,
        skip_tls_verify: bool,
    ) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(skip_tls_verify)
            .user_agent(concat!("service-broker-controller/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    fn url(&self, path: &str) -> Result<Url, BrokerError> {
        let mut url = Url::parse(&self.connection.url).map_err(|e| BrokerError::InvalidUrl {
            url: self.connection.url.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(BrokerError::InvalidUrl {
                url: self.connection.url.clone(),
                reason: "url cannot be a base".to_owned(),
            });
        }
        // keep any path prefix the broker is mounted under
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        Ok(url)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        operation: Operation,
        ids: (Option<&str>, Option<&str>),
        params: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<RawResponse, BrokerError> {
        let mut builder = PathBuilder::new(operation);
        if let Some(instance_id) = ids.0 {
            builder = builder.instance(instance_id);
        }
        if let Some(binding_id) = ids.1 {
            builder = builder.binding(binding_id);
        }
        let path = builder.build().map_err(|e| BrokerError::InvalidUrl {
            url: self.connection.url.clone(),
            reason: e.to_string(),
        })?;
        let mut url = self.url(&path)?;
        {
            let mut pairs = url.query_pairs_mut();
            if operation.is_write() {
                pairs.append_pair(query::ACCEPTS_INCOMPLETE, "true");
            }
            for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
                pairs.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let mut request = self
            .http
            .request(http_method(operation), url)
            .header(API_VERSION_HEADER, API_VERSION)
            .basic_auth(&self.connection.username, Some(&self.connection.password));
        if let Some(body) = body {
            request = request.json(body);
        }

        let span = info_span!(
            "osbapi.request",
            operation = %operation,
            broker.name = %self.broker_name,
            instance.id = ids.0.unwrap_or_default(),
            binding.id = ids.1.unwrap_or_default(),
        );

        let started = Instant::now();
        let result = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                body: body.to_vec(),
            })
        }
        .instrument(span)
        .await;
        metrics::observe_broker_request_duration(operation.as_str(), started.elapsed().as_secs_f64());

        match result {
            Ok(raw) => {
                debug!(
                    operation = %operation,
                    broker.name = %self.broker_name,
                    status = raw.status.as_u16(),
                    "broker responded"
                );
                Ok(raw)
            }
            Err(source) => {
                metrics::increment_broker_requests(operation.as_str(), "transport_error");
                Err(BrokerError::Transport { operation, source })
            }
        }
    }

    fn record(operation: Operation, result: Result<RawResponse, BrokerError>) -> Result<RawResponse, BrokerError> {
        if let Ok(raw) = &result {
            metrics::increment_broker_requests(operation.as_str(), raw.status.as_str());
        }
        result
    }
}

fn http_method(operation: Operation) -> Method {
    match operation.method() {
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        _ => Method::GET,
    }
}

/// Decode a body that may legitimately be empty
fn decode_or_default<T: DeserializeOwned + Default>(
    operation: Operation,
    body: &[u8],
) -> Result<T, BrokerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    decode(operation, body)
}

fn decode<T: DeserializeOwned>(operation: Operation, body: &[u8]) -> Result<T, BrokerError> {
    serde_json::from_slice(body).map_err(|source| BrokerError::Decode { operation, source })
}

/// Shared handling of provision, deprovision and unbind responses
fn operation_response(
    operation: Operation,
    raw: &RawResponse,
    gone_allowed: bool,
) -> Result<OperationResponse, BrokerError> {
    match raw.status {
        StatusCode::OK | StatusCode::CREATED => {
            let body: OperationBody = decode_or_default(operation, &raw.body)?;
            Ok(OperationResponse {
                operation: body.operation,
                is_async: false,
            })
        }
        StatusCode::ACCEPTED => {
            let body: OperationBody = decode_or_default(operation, &raw.body)?;
            Ok(OperationResponse {
                operation: body.operation,
                is_async: true,
            })
        }
        StatusCode::GONE if gone_allowed => Err(BrokerError::Gone { operation }),
        status => Err(BrokerError::unexpected_status(
            operation,
            status.as_u16(),
            &raw.body,
        )),
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn get_catalog(&self) -> Result<Catalog, BrokerError> {
        let op = Operation::GetCatalog;
        let raw = Self::record(op, self.send::<()>(op, (None, None), &[], None).await)?;
        if !raw.status.is_success() {
            return Err(BrokerError::unexpected_status(op, raw.status.as_u16(), &raw.body));
        }
        decode(op, &raw.body)
    }

    async fn provision(
        &self,
        payload: &ProvisionPayload,
    ) -> Result<OperationResponse, BrokerError> {
        let op = Operation::Provision;
        let raw = Self::record(
            op,
            self.send(op, (Some(&payload.instance_id), None), &[], Some(&payload.request))
                .await,
        )?;
        operation_response(op, &raw, false)
    }

    async fn deprovision(
        &self,
        payload: &DeprovisionPayload,
    ) -> Result<OperationResponse, BrokerError> {
        let op = Operation::Deprovision;
        let params = [
            (query::SERVICE_ID, payload.service_id.as_str()),
            (query::PLAN_ID, payload.plan_id.as_str()),
        ];
        let raw = Self::record(
            op,
            self.send::<()>(op, (Some(&payload.instance_id), None), &params, None)
                .await,
        )?;
        operation_response(op, &raw, true)
    }

    async fn get_last_operation(
        &self,
        request: &LastOperationRequest,
    ) -> Result<LastOperationResponse, BrokerError> {
        let op = if request.binding_id.is_some() {
            Operation::GetBindingLastOperation
        } else {
            Operation::GetInstanceLastOperation
        };
        let params = [
            (query::SERVICE_ID, request.service_id.as_str()),
            (query::PLAN_ID, request.plan_id.as_str()),
            (query::OPERATION, request.operation.as_deref().unwrap_or_default()),
        ];
        let raw = Self::record(
            op,
            self.send::<()>(
                op,
                (Some(&request.instance_id), request.binding_id.as_deref()),
                &params,
                None,
            )
            .await,
        )?;
        match raw.status {
            StatusCode::OK => decode(op, &raw.body),
            StatusCode::GONE => Err(BrokerError::Gone { operation: op }),
            status => Err(BrokerError::unexpected_status(op, status.as_u16(), &raw.body)),
        }
    }

    async fn bind(&self, payload: &BindPayload) -> Result<BindResponse, BrokerError> {
        let op = Operation::Bind;
        let raw = Self::record(
            op,
            self.send(
                op,
                (Some(&payload.instance_id), Some(&payload.binding_id)),
                &[],
                Some(&payload.request),
            )
            .await,
        )?;
        match raw.status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                let body: OperationBody = decode_or_default(op, &raw.body)?;
                Ok(BindResponse {
                    credentials: body.credentials,
                    operation: body.operation,
                    is_async: raw.status == StatusCode::ACCEPTED,
                })
            }
            StatusCode::CONFLICT => Err(BrokerError::Conflict { operation: op }),
            status => Err(BrokerError::unexpected_status(op, status.as_u16(), &raw.body)),
        }
    }

    async fn unbind(&self, binding: &BindingRef) -> Result<OperationResponse, BrokerError> {
        let op = Operation::Unbind;
        let params = [
            (query::SERVICE_ID, binding.service_id.as_str()),
            (query::PLAN_ID, binding.plan_id.as_str()),
        ];
        let raw = Self::record(
            op,
            self.send::<()>(
                op,
                (Some(&binding.instance_id), Some(&binding.binding_id)),
                &params,
                None,
            )
            .await,
        )?;
        operation_response(op, &raw, true)
    }

    async fn get_binding(&self, binding: &BindingRef) -> Result<GetBindingResponse, BrokerError> {
        let op = Operation::GetBinding;
        let params = [
            (query::SERVICE_ID, binding.service_id.as_str()),
            (query::PLAN_ID, binding.plan_id.as_str()),
        ];
        let raw = Self::record(
            op,
            self.send::<()>(
                op,
                (Some(&binding.instance_id), Some(&binding.binding_id)),
                &params,
                None,
            )
            .await,
        )?;
        match raw.status {
            StatusCode::OK => decode(op, &raw.body),
            status => Err(BrokerError::unexpected_status(op, status.as_u16(), &raw.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> HttpBrokerClient {
        HttpBrokerClient::new(
            "test",
            BrokerConnection::new(url, "user", "pass"),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn url_keeps_broker_path_prefix() {
        let url = client("https://broker.example.com/osb/").url("/v2/catalog").unwrap();
        assert_eq!(url.as_str(), "https://broker.example.com/osb/v2/catalog");
    }

    #[test]
    fn url_without_prefix() {
        let url = client("http://127.0.0.1:8080").url("/v2/catalog").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v2/catalog");
    }

    #[test]
    fn invalid_broker_url_is_reported() {
        let err = client("not a url").url("/v2/catalog").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidUrl { .. }));
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", BrokerConnection::new("http://b", "user", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("user"));
    }

    #[test]
    fn empty_body_decodes_to_default() {
        let body: OperationBody = decode_or_default(Operation::Provision, b"  ").unwrap();
        assert!(body.operation.is_none());
        assert!(body.credentials.is_empty());
    }

    #[test]
    fn gone_only_where_allowed() {
        let raw = RawResponse {
            status: StatusCode::GONE,
            body: Vec::new(),
        };
        assert!(operation_response(Operation::Deprovision, &raw, true)
            .unwrap_err()
            .is_gone());
        assert!(operation_response(Operation::Provision, &raw, false)
            .unwrap_err()
            .is_unrecoverable());
    }
}
