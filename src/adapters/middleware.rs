//! Axum middleware for the gateway's ingress side.
//!
//! Two concerns live here: bounded admission (shedding with a 503 envelope
//! the moment the gate is saturated, never queueing) and per-request ids for
//! log correlation. Both stay out of the relay path's way: a dispatched
//! response passes through untouched apart from the added `X-Request-ID`.
use std::{future::Future, pin::Pin};

use axum::{extract::Request, middleware::Next, response::Response};
use hyper::{StatusCode, header::HeaderValue};
use tracing::Instrument;

use crate::{
    adapters::http_handler::{ErrorCode, error_response},
    core::IngressGate,
    metrics::set_inflight_requests,
};

/// Admit the request through the ingress gate or shed it immediately.
///
/// The permit is held until the response is complete, so slow dispatches
/// count against capacity for their full duration.
pub async fn load_shed_middleware(req: Request, next: Next, gate: IngressGate) -> Response {
    let Some(permit) = gate.try_admit() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServiceUnavailable,
            "Gateway at capacity, request rejected",
        );
    };
    set_inflight_requests(gate.in_flight());

    let response = next.run(req).await;

    drop(permit);
    set_inflight_requests(gate.in_flight());
    response
}

/// Create a cloneable closure wrapping [`load_shed_middleware`].
pub fn create_load_shed_middleware(
    gate: IngressGate,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let gate = gate.clone();
        Box::pin(async move { load_shed_middleware(req, next, gate).await })
    }
}

/// Generate a per-request UUID and expose it via tracing plus `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    // Instrumenting keeps the span entered for the whole downstream run
    // without holding a span guard across the await
    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}
