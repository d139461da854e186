//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates immutable configuration (`GatewayConfig`)
//! with runtime state (the endpoint cache and per-service circuit breakers).
//! It provides:
//! * Service path parsing under the configured API prefix
//! * Lazy get-or-create of exactly one circuit breaker per service name
//! * The dispatch operation: resolve the endpoint, forward, relay
//! * Breaker-to-cache wiring (an opening breaker drops the cached endpoint)
//!
//! Instances are plain injected values; nothing here is process-global, so
//! tests can run several gateways side by side.
use std::sync::Arc;

use axum::body::Body as AxumBody;
use hyper::Response;
use scc::HashMap;
use thiserror::Error;

use crate::{
    config::GatewayConfig,
    core::{
        circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState},
        dispatcher::{self, InFlightRequest},
        endpoint_cache::EndpointCache,
        ingress::{ServicePath, parse_service_path},
    },
    ports::{HttpClientError, HttpClientFactory, ServiceRegistry},
};

/// Errors produced by the dispatch path, before breaker classification.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// The request path named no service
    #[error("Empty service name in request path")]
    EmptyServiceName,

    /// The registry has no live record for the service
    #[error("Service [{0}] not published")]
    ServiceNotPublished(String),

    /// The forward to the resolved endpoint failed at the transport level
    #[error("Dispatch to service [{service}] failed: {source}")]
    Dispatch {
        service: String,
        #[source]
        source: HttpClientError,
    },
}

/// Central orchestrator for service dispatch.
///
/// Construct with [`GatewayService::new`] by passing the configuration, a
/// registry backend and a client factory. The endpoint cache and breaker map
/// start empty and fill on first use per service.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    endpoints: Arc<EndpointCache>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl GatewayService {
    /// Create a new gateway service.
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<dyn ServiceRegistry>,
        client_factory: Arc<dyn HttpClientFactory>,
    ) -> Self {
        Self {
            config,
            endpoints: Arc::new(EndpointCache::new(registry, client_factory)),
            breakers: HashMap::new(),
        }
    }

    /// The endpoint cache (mainly for adapters / diagnostics).
    pub fn endpoints(&self) -> &EndpointCache {
        &self.endpoints
    }

    /// Parse `path` (plus optional query) as a service dispatch under the
    /// configured API prefix.
    pub fn parse_path(&self, path: &str, query: Option<&str>) -> Option<ServicePath> {
        parse_service_path(path, query, &self.config.api_prefix)
    }

    /// The circuit breaker guarding `service_name`, created on first use.
    ///
    /// Exactly one breaker exists per service name for the life of the
    /// gateway; every caller shares it.
    pub async fn circuit_breaker(&self, service_name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry_async(service_name.to_string())
            .await
            .or_insert_with(|| Arc::new(self.build_breaker(service_name)))
            .get()
            .clone()
    }

    fn build_breaker(&self, service_name: &str) -> CircuitBreaker {
        let endpoints = self.endpoints.clone();
        CircuitBreaker::new(service_name, self.config.circuit_breaker.clone())
            .with_open_listener(move |service| {
                // A tripped service must not keep serving from a possibly
                // broken connection; the next trial resolves afresh
                endpoints.invalidate(service);
            })
    }

    /// Dispatch `request` to `service_name` under its circuit breaker.
    ///
    /// This is the full lifecycle of one service call: breaker admission,
    /// endpoint resolution, forward, relay. Failures come back as breaker
    /// errors wrapping [`GatewayError`]; translating them into HTTP responses
    /// is the ingress adapter's job.
    pub async fn dispatch(
        &self,
        service_name: &str,
        request: InFlightRequest,
    ) -> Result<Response<AxumBody>, CircuitBreakerError<GatewayError>> {
        if service_name.trim().is_empty() {
            return Err(CircuitBreakerError::Operation(GatewayError::EmptyServiceName));
        }

        let breaker = self.circuit_breaker(service_name).await;
        breaker
            .execute(|| self.resolve_and_forward(service_name, request))
            .await
    }

    /// Resolve the endpoint for `service_name` and forward `request` to it.
    ///
    /// Any resolution failure surfaces as "not published"; the distinction
    /// between a missing record and an unreachable registry is logged, not
    /// exposed.
    pub async fn resolve_and_forward(
        &self,
        service_name: &str,
        request: InFlightRequest,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let endpoint = match self.endpoints.get(service_name).await {
            Ok(endpoint) => endpoint,
            Err(error) => {
                tracing::debug!(service = %service_name, %error, "Endpoint resolution failed");
                return Err(GatewayError::ServiceNotPublished(service_name.to_string()));
            }
        };

        dispatcher::forward(request, &endpoint)
            .await
            .map_err(|source| GatewayError::Dispatch {
                service: service_name.to_string(),
                source,
            })
    }

    /// Current state of every breaker created so far.
    pub async fn breaker_snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut snapshot = Vec::new();
        self.breakers
            .scan_async(|name, breaker| {
                snapshot.push((name.clone(), breaker.state()));
            })
            .await;
        snapshot
    }

    /// Drop cached endpoints. Called at shutdown after the ingress drains.
    pub async fn shutdown(&self) {
        self.endpoints.clear().await;
        tracing::info!("Gateway state cleared");
    }
}
