//! Request forwarding.
//!
//! The dispatcher turns a captured inbound request into an outbound request
//! against a resolved endpoint and relays the backend's response. It does not
//! interpret the exchange: method, URI and headers pass through verbatim, and
//! any HTTP response the backend produces (error statuses included) is a
//! successful dispatch. Only transport-level failures are errors.
use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, header};
use hyper::{Request, Response};
use url::form_urlencoded;

use crate::{
    core::endpoint_cache::EndpointHandle,
    metrics::increment_dispatch_total,
    ports::{HttpClientError, HttpClientResult},
};

/// Header carrying the serialized identity of the inbound caller.
pub const USER_PRINCIPAL_HEADER: &str = "user-principal";

/// Identity attached to an inbound request by an upstream auth layer.
///
/// Stored in the request extensions; the dispatcher serializes it into the
/// `user-principal` header so backends see who is calling.
#[derive(Debug, Clone)]
pub struct UserPrincipal(pub serde_json::Value);

impl UserPrincipal {
    fn as_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0.to_string()).ok()
    }
}

/// Body of a captured inbound request, in forwarding priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Form fields parsed from an urlencoded body, re-encoded on dispatch
    Form(Vec<(String, String)>),
    /// Raw bytes forwarded unchanged
    Buffer(Bytes),
    /// No body
    Empty,
}

/// An inbound request captured at the ingress boundary, ready to dispatch.
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub method: Method,
    /// Path remainder after `/api/<service>`, query string included
    pub service_uri: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub principal: Option<UserPrincipal>,
}

impl InFlightRequest {
    /// Capture an inbound request, classifying its body.
    ///
    /// An urlencoded body becomes form fields, any other non-empty body is
    /// kept as a raw buffer, and an empty body stays empty.
    pub fn new(
        method: Method,
        service_uri: String,
        headers: HeaderMap,
        body: Bytes,
        principal: Option<UserPrincipal>,
    ) -> Self {
        let body = if body.is_empty() {
            RequestBody::Empty
        } else if is_form_content_type(&headers) {
            RequestBody::Form(form_urlencoded::parse(&body).into_owned().collect())
        } else {
            RequestBody::Buffer(body)
        };

        Self {
            method,
            service_uri,
            headers,
            body,
            principal,
        }
    }
}

fn is_form_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

/// Forward a captured request to the resolved endpoint and relay the
/// backend's response.
pub async fn forward(
    request: InFlightRequest,
    endpoint: &EndpointHandle,
) -> HttpClientResult<Response<AxumBody>> {
    let uri = endpoint.request_uri(&request.service_uri);
    let method = request.method.clone();

    let (body, form_content_type) = match request.body {
        RequestBody::Form(pairs) => {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            (AxumBody::from(encoded), true)
        }
        RequestBody::Buffer(bytes) => (AxumBody::from(bytes), false),
        RequestBody::Empty => (AxumBody::empty(), false),
    };

    let mut outbound = Request::builder()
        .method(request.method)
        .uri(&uri)
        .body(body)
        .map_err(|e| HttpClientError::InvalidRequest(format!("{uri}: {e}")))?;

    let headers = outbound.headers_mut();
    for (name, value) in request.headers.iter() {
        headers.append(name.clone(), value.clone());
    }
    // The outbound body is re-framed by the client, and a re-encoded form may
    // differ in length from the inbound bytes.
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    if form_content_type {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    }

    // The identity header is always gateway-asserted; an inbound value never
    // survives, so callers cannot smuggle their own
    match request.principal.as_ref().map(UserPrincipal::as_header_value) {
        Some(Some(value)) => {
            headers.insert(USER_PRINCIPAL_HEADER, value);
        }
        Some(None) => {
            tracing::warn!("Dropping unserializable user principal");
            headers.remove(USER_PRINCIPAL_HEADER);
        }
        None => {
            headers.remove(USER_PRINCIPAL_HEADER);
        }
    }

    let mut response = endpoint.client().send_request(outbound).await?;
    increment_dispatch_total(
        &endpoint.record().name,
        method.as_str(),
        response.status().as_u16(),
    );

    // Status and headers relay as-is; the body streams through. Framing is
    // re-derived by the server side of the relay.
    response.headers_mut().remove(header::TRANSFER_ENCODING);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::ports::{HttpClient, registry::{ServiceRecord, ServiceStatus}};

    struct SeenRequest {
        method: Method,
        uri: String,
        headers: HeaderMap,
        body: Bytes,
    }

    struct CapturingClient {
        seen: Mutex<Option<SeenRequest>>,
        response_status: StatusCode,
    }

    impl CapturingClient {
        fn new(response_status: StatusCode) -> Self {
            Self {
                seen: Mutex::new(None),
                response_status,
            }
        }

        fn seen(&self) -> SeenRequest {
            self.seen.lock().unwrap().take().expect("no request captured")
        }
    }

    #[async_trait]
    impl HttpClient for CapturingClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await.unwrap().to_bytes();
            *self.seen.lock().unwrap() = Some(SeenRequest {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: bytes,
            });

            let response = Response::builder()
                .status(self.response_status)
                .header("x-backend", "one")
                .header(header::TRANSFER_ENCODING, "chunked")
                .body(AxumBody::from("backend says hi"))
                .unwrap();
            Ok(response)
        }
    }

    fn endpoint_with(client: Arc<CapturingClient>) -> EndpointHandle {
        let record = ServiceRecord {
            name: "orders".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8086,
            root: "/".to_string(),
            status: ServiceStatus::Up,
            registration: None,
        };
        EndpointHandle::new(record, client)
    }

    fn plain_request(method: Method, service_uri: &str) -> InFlightRequest {
        InFlightRequest::new(
            method,
            service_uri.to_string(),
            HeaderMap::new(),
            Bytes::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_forward_copies_method_and_uri_verbatim() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        forward(plain_request(Method::PUT, "/items/5?full=1"), &endpoint)
            .await
            .unwrap();

        let seen = client.seen();
        assert_eq!(seen.method, Method::PUT);
        assert_eq!(seen.uri, "http://127.0.0.1:8086/items/5?full=1");
        assert!(seen.body.is_empty());
    }

    #[tokio::test]
    async fn test_forward_preserves_duplicate_headers() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));

        let request = InFlightRequest::new(
            Method::GET,
            "/".to_string(),
            headers,
            Bytes::new(),
            None,
        );
        forward(request, &endpoint).await.unwrap();

        let seen = client.seen();
        let tags: Vec<_> = seen.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        // Framing is recomputed, not relayed
        assert!(seen.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn test_forward_serializes_principal_header() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        let mut headers = HeaderMap::new();
        headers.insert(USER_PRINCIPAL_HEADER, HeaderValue::from_static("spoofed"));

        let request = InFlightRequest::new(
            Method::GET,
            "/".to_string(),
            headers,
            Bytes::new(),
            Some(UserPrincipal(json!({"username": "ada"}))),
        );
        forward(request, &endpoint).await.unwrap();

        let seen = client.seen();
        let values: Vec<_> = seen.headers.get_all(USER_PRINCIPAL_HEADER).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], r#"{"username":"ada"}"#);
    }

    #[tokio::test]
    async fn test_forward_strips_spoofed_principal_when_anonymous() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        let mut headers = HeaderMap::new();
        headers.insert(USER_PRINCIPAL_HEADER, HeaderValue::from_static("spoofed"));

        let request = InFlightRequest::new(
            Method::GET,
            "/".to_string(),
            headers,
            Bytes::new(),
            None,
        );
        forward(request, &endpoint).await.unwrap();

        assert!(client.seen().headers.get(USER_PRINCIPAL_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_forward_reencodes_form_body() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );

        let request = InFlightRequest::new(
            Method::POST,
            "/".to_string(),
            headers,
            Bytes::from_static(b"name=mug&qty=2"),
            None,
        );
        assert!(matches!(request.body, RequestBody::Form(_)));
        forward(request, &endpoint).await.unwrap();

        let seen = client.seen();
        assert_eq!(seen.body, Bytes::from_static(b"name=mug&qty=2"));
        assert_eq!(
            seen.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[tokio::test]
    async fn test_forward_passes_raw_buffer_through() {
        let client = Arc::new(CapturingClient::new(StatusCode::OK));
        let endpoint = endpoint_with(client.clone());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let request = InFlightRequest::new(
            Method::POST,
            "/".to_string(),
            headers,
            Bytes::from_static(b"{\"name\":\"mug\"}"),
            None,
        );
        assert!(matches!(request.body, RequestBody::Buffer(_)));
        forward(request, &endpoint).await.unwrap();

        assert_eq!(client.seen().body, Bytes::from_static(b"{\"name\":\"mug\"}"));
    }

    #[tokio::test]
    async fn test_forward_relays_error_statuses_as_success() {
        let client = Arc::new(CapturingClient::new(StatusCode::CONFLICT));
        let endpoint = endpoint_with(client);

        let response = forward(plain_request(Method::GET, "/"), &endpoint)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers().get("x-backend").unwrap(), "one");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"backend says hi"));
    }

    #[test]
    fn test_body_classification_priority() {
        let mut form_headers = HeaderMap::new();
        form_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let form = InFlightRequest::new(
            Method::POST,
            "/".to_string(),
            form_headers.clone(),
            Bytes::from_static(b"a=1"),
            None,
        );
        assert_eq!(
            form.body,
            RequestBody::Form(vec![("a".to_string(), "1".to_string())])
        );

        // Form content type with no bytes is still an empty body
        let empty_form = InFlightRequest::new(
            Method::POST,
            "/".to_string(),
            form_headers,
            Bytes::new(),
            None,
        );
        assert_eq!(empty_form.body, RequestBody::Empty);
    }
}
