//! HTTP surface of the gateway.
//!
//! `GatewayHandler` translates between HTTP and the core: it routes dispatch
//! requests under the API prefix, exposes the discovery REST endpoints, and
//! renders every failure as the wire error envelope
//! `{"error": {"errorCode", "errorMessage"}}`.
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{Path, Request as AxumRequest, State},
    http::{StatusCode, header},
    routing::{delete, get},
};
use http_body_util::BodyExt;
use hyper::{Response, header::HeaderValue};
use serde_json::json;
use uuid::Uuid;

use crate::{
    core::{
        GatewayService,
        circuit_breaker::{CircuitBreakerError, CircuitState},
        dispatcher::{InFlightRequest, UserPrincipal},
        gateway::GatewayError,
        ingress::ServicePath,
    },
    metrics::{RequestTimer, increment_request_total},
    ports::registry::{RegistryError, ServiceRecord, ServiceRegistry},
};

/// Wire error codes carried in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    SystemError,
    CircuitOpen,
    Timeout,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::SystemError => "SYSTEM_ERROR",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Build the JSON error envelope every failure is reported through.
pub fn error_response(
    status: StatusCode,
    code: ErrorCode,
    message: &str,
) -> Response<AxumBody> {
    let body = json!({
        "error": {
            "errorCode": code.as_str(),
            "errorMessage": message,
        }
    });

    let mut response = Response::new(AxumBody::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<AxumBody> {
    match serde_json::to_string(body) {
        Ok(encoded) => {
            let mut response = Response::new(AxumBody::from(encoded));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(error) => {
            tracing::error!(%error, "Failed to serialize response body");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::SystemError,
                "Response serialization failed",
            )
        }
    }
}

/// HTTP handler wiring the core gateway to Axum.
#[derive(Clone)]
pub struct GatewayHandler {
    gateway: Arc<GatewayService>,
    registry: Arc<dyn ServiceRegistry>,
}

impl GatewayHandler {
    pub fn new(gateway: Arc<GatewayService>, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { gateway, registry }
    }

    /// Entry point for every request no explicit route claimed.
    ///
    /// Paths under the API prefix are dispatched; anything else gets the
    /// welcome document.
    pub async fn handle_request(&self, req: AxumRequest) -> Response<AxumBody> {
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);

        match self.gateway.parse_path(&path, query.as_deref()) {
            Some(service_path) => self.handle_service_request(service_path, req).await,
            None => self.handle_welcome(),
        }
    }

    /// Dispatch one request to the named service.
    async fn handle_service_request(
        &self,
        service_path: ServicePath,
        req: AxumRequest,
    ) -> Response<AxumBody> {
        let ServicePath {
            service_name,
            service_uri,
        } = service_path;
        let method = req.method().clone();
        let _timer = RequestTimer::new(&service_name, method.as_str());

        // Rejected before the registry or a breaker is ever consulted
        if service_name.trim().is_empty() {
            let response = error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                "Empty service name in request path",
            );
            increment_request_total(&service_name, method.as_str(), response.status().as_u16());
            return response;
        }

        let principal = req.extensions().get::<UserPrincipal>().cloned();
        let headers = req.headers().clone();
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => {
                tracing::warn!(service = %service_name, %error, "Failed to read request body");
                let response = error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidRequest,
                    "Unreadable request body",
                );
                increment_request_total(
                    &service_name,
                    method.as_str(),
                    response.status().as_u16(),
                );
                return response;
            }
        };

        let request = InFlightRequest::new(method.clone(), service_uri, headers, body, principal);

        let breaker = self.gateway.circuit_breaker(&service_name).await;
        let gateway = self.gateway.clone();
        let dispatch_name = service_name.clone();
        let result = breaker
            .execute_with_fallback(
                || async move { gateway.resolve_and_forward(&dispatch_name, request).await },
                |error| {
                    tracing::warn!(service = %service_name, %error, "Dispatch failed, serving fallback");
                    breaker_error_response(&service_name, &error)
                },
            )
            .await;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(service = %service_name, %error, "Dispatch failed");
                breaker_error_response(&service_name, &error)
            }
        };

        increment_request_total(&service_name, method.as_str(), response.status().as_u16());
        response
    }

    /// Liveness document: record count, breaker states, timestamp.
    pub async fn handle_health(&self) -> Response<AxumBody> {
        let services = match self.registry.records().await {
            Ok(records) => records.len(),
            Err(error) => {
                tracing::warn!(%error, "Registry unavailable during health check");
                0
            }
        };

        let breakers = self.gateway.breaker_snapshot().await;
        let open = breakers
            .iter()
            .filter(|(_, state)| *state == CircuitState::Open)
            .count();

        let health = json!({
            "status": "UP",
            "services": services,
            "circuit_breakers": {
                "total": breakers.len(),
                "open": open,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &health)
    }

    fn handle_welcome(&self) -> Response<AxumBody> {
        let welcome = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        });
        json_response(StatusCode::OK, &welcome)
    }

    /// GET /discovery: every stored record.
    pub async fn list_services(&self) -> Response<AxumBody> {
        match self.registry.records().await {
            Ok(records) => json_response(StatusCode::OK, &records),
            Err(error) => registry_error_response(&error),
        }
    }

    /// POST /discovery: publish a record, returning it with its registration.
    pub async fn publish_service(&self, record: ServiceRecord) -> Response<AxumBody> {
        match self.registry.publish(record).await {
            Ok(published) => {
                // A fresh record supersedes whatever endpoint was cached
                self.gateway.endpoints().invalidate(&published.name);
                json_response(StatusCode::CREATED, &published)
            }
            Err(error) => registry_error_response(&error),
        }
    }

    /// DELETE /discovery/{registration}: withdraw a record.
    pub async fn unpublish_service(&self, registration: Uuid) -> Response<AxumBody> {
        // Resolve the name first so the cached endpoint can be dropped too
        let name = match self.registry.records().await {
            Ok(records) => records
                .iter()
                .find(|record| record.registration == Some(registration))
                .map(|record| record.name.clone()),
            Err(_) => None,
        };

        match self.registry.unpublish(registration).await {
            Ok(()) => {
                if let Some(name) = name {
                    self.gateway.endpoints().invalidate(&name);
                }
                let mut response = Response::new(AxumBody::empty());
                *response.status_mut() = StatusCode::NO_CONTENT;
                response
            }
            Err(error) => registry_error_response(&error),
        }
    }
}

/// Translate a failed dispatch into its wire envelope.
fn breaker_error_response(
    service: &str,
    error: &CircuitBreakerError<GatewayError>,
) -> Response<AxumBody> {
    match error {
        CircuitBreakerError::Open { .. } => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::CircuitOpen,
            &format!("Circuit for service [{service}] is open"),
        ),
        CircuitBreakerError::Timeout { timeout_ms } => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Timeout,
            &format!("Dispatch to service [{service}] timed out after {timeout_ms} ms"),
        ),
        CircuitBreakerError::Operation(GatewayError::EmptyServiceName) => error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidRequest,
            "Empty service name in request path",
        ),
        CircuitBreakerError::Operation(error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::SystemError,
            &error.to_string(),
        ),
    }
}

fn registry_error_response(error: &RegistryError) -> Response<AxumBody> {
    match error {
        RegistryError::InvalidRecord(message) => {
            error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, message)
        }
        RegistryError::UnknownRegistration(registration) => error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::InvalidRequest,
            &format!("Unknown registration [{registration}]"),
        ),
        other => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::SystemError,
            &other.to_string(),
        ),
    }
}

/// Build the gateway router: discovery REST, health, and the dispatch
/// fallback for everything else.
pub fn router(handler: GatewayHandler) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/discovery", get(list_services).post(publish_service))
        .route("/discovery/{registration}", delete(unpublish_service))
        .fallback(fallback)
        .with_state(handler)
}

async fn health(State(handler): State<GatewayHandler>) -> Response<AxumBody> {
    handler.handle_health().await
}

async fn list_services(State(handler): State<GatewayHandler>) -> Response<AxumBody> {
    handler.list_services().await
}

async fn publish_service(
    State(handler): State<GatewayHandler>,
    Json(record): Json<ServiceRecord>,
) -> Response<AxumBody> {
    handler.publish_service(record).await
}

async fn unpublish_service(
    State(handler): State<GatewayHandler>,
    Path(registration): Path<Uuid>,
) -> Response<AxumBody> {
    handler.unpublish_service(registration).await
}

async fn fallback(State(handler): State<GatewayHandler>, req: AxumRequest) -> Response<AxumBody> {
    handler.handle_request(req).await
}
