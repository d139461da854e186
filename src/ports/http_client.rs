use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
///
/// Only transport-level problems are errors here. A response with a 4xx or
/// 5xx status is still a response and is relayed to the caller untouched.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to backend fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} ms")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to
/// resolved service endpoints
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a backend server
    ///
    /// # Arguments
    /// * `req` - The HTTP request to send, with an absolute-form URI
    ///
    /// # Returns
    /// A future that resolves to the backend's response or an error
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}

/// Builds a dedicated [`HttpClient`] for each resolved endpoint.
///
/// Each endpoint handle owns its own client (and connection pool), so
/// invalidating the handle drops the pool with it. Tests substitute a
/// factory producing mock clients.
pub trait HttpClientFactory: Send + Sync + 'static {
    /// Create a fresh client instance.
    fn create(&self) -> HttpClientResult<Arc<dyn HttpClient>>;
}
