use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientFactory, HttpClientResult};

/// HTTP client adapter over Hyper's pooled legacy client (plain HTTP/1.1).
///
/// Responsibilities:
/// * Sets the Host header from the target authority
/// * Forces request version to HTTP/1.1
/// * Converts between Hyper body and Axum body types
///
/// The adapter stays transport-only: timeouts and failure accounting are
/// layered on by the circuit breaker, never here.
pub struct HttpClientAdapter {
    client: Client<HttpConnector, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter with its own connection pool.
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http::<AxumBody>();
        Self { client }
    }
}

impl Default for HttpClientAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let client = self.client.clone();

        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let request_path = req.uri().path().to_string();
        let request_method = req.method().to_string();

        // The request future is instrumented rather than entered; an entered
        // span guard cannot be held across an await point
        let span = tracing::info_span!(
            "backend_request",
            backend.url = %backend_identifier,
            http.method = %request_method,
            http.path = %request_path,
            http.status_code = tracing::field::Empty,
        );

        // Absolute-form URIs carry the authority; the Host header must match it
        if let Some(host_str) = req.uri().host() {
            let host_header_val = if let Some(port) = req.uri().port() {
                HeaderValue::from_str(&format!("{host_str}:{}", port.as_u16()))
                    .unwrap_or_else(|_| HeaderValue::from_static(""))
            } else {
                HeaderValue::from_str(host_str).unwrap_or_else(|_| HeaderValue::from_static(""))
            };
            if !host_header_val.is_empty() {
                req.headers_mut().insert(header::HOST, host_header_val);
            }
        } else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        span.in_scope(|| {
            tracing::debug!(
                "Sending request: {} {} (headers: {:?})",
                parts.method,
                parts.uri,
                parts.headers
            );
        });

        let outgoing_request = Request::from_parts(parts, body);
        let method_for_error_log = outgoing_request.method().clone();
        let uri_for_error_log = outgoing_request.uri().clone();

        match client
            .request(outgoing_request)
            .instrument(span.clone())
            .await
        {
            Ok(response) => {
                let status_code = response.status().as_u16();
                span.record("http.status_code", status_code);

                let (mut parts, hyper_body) = response.into_parts();

                // The body is re-framed when relayed; a stale Transfer-Encoding
                // header would contradict the new framing
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                span.in_scope(|| {
                    tracing::error!(
                        "Error making request to backend {} ({} {}): {}",
                        backend_identifier,
                        method_for_error_log,
                        uri_for_error_log,
                        e
                    );
                });

                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method_for_error_log} {uri_for_error_log} failed: {e}"
                )))
            }
        }
    }
}

/// Factory handing out one pooled client per cached endpoint.
///
/// Each service endpoint gets its own adapter so invalidating an endpoint
/// also retires its connection pool.
pub struct PooledClientFactory;

impl PooledClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PooledClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientFactory for PooledClientFactory {
    fn create(&self) -> HttpClientResult<Arc<dyn HttpClient>> {
        Ok(Arc::new(HttpClientAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, extract::Request as AxumRequest, routing::get};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_send_request_rejects_relative_uri() {
        let client = HttpClientAdapter::new();
        let req = Request::builder()
            .method("GET")
            .uri("/no-authority")
            .body(AxumBody::empty())
            .unwrap();

        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_send_request_sets_host_from_authority() {
        // Echo back the received Host header so the assertion sees what
        // actually went over the wire
        let app = Router::new().route(
            "/echo-host",
            get(|req: AxumRequest| async move {
                req.headers()
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HttpClientAdapter::new();
        let req = Request::builder()
            .method("GET")
            .uri(format!("http://{addr}/echo-host"))
            .body(AxumBody::empty())
            .unwrap();

        let response = client.send_request(req).await.unwrap();
        assert!(response.status().is_success());

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body, format!("{addr}").as_bytes());
    }

    #[tokio::test]
    async fn test_send_request_connection_refused() {
        let client = HttpClientAdapter::new();
        // Port 1 is never bound in the test environment
        let req = Request::builder()
            .method("GET")
            .uri("http://127.0.0.1:1/")
            .body(AxumBody::empty())
            .unwrap();

        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_factory_creates_independent_clients() {
        let factory = PooledClientFactory::new();
        let first = factory.create().unwrap();
        let second = factory.create().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
