pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod registry;

/// Re-export commonly used types from adapters
pub use http_client::{HttpClientAdapter, PooledClientFactory};
pub use http_handler::GatewayHandler;
pub use middleware::*;
pub use registry::InMemoryRegistry;
