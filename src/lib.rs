//! Junction - a dynamic API gateway over a service registry.
//!
//! Junction dispatches inbound HTTP requests to named backend services. The
//! request path names the target: `/api/<service>/<rest>` resolves `<service>`
//! through a service registry, and `<rest>` is forwarded verbatim to whatever
//! endpoint the service last published. There is no static route table;
//! services appear by publishing a record and disappear by withdrawing it.
//!
//! # Features
//! - Path-based dynamic dispatch over published service records
//! - Bounded ingress with immediate load shedding (no request queue)
//! - Per-service circuit breakers with endpoint cache invalidation
//! - Verbatim relay: method, URI, headers (duplicates included) and error
//!   statuses pass through untouched
//! - Caller identity forwarded via the `user-principal` header
//! - Discovery REST surface for publishing and withdrawing records
//! - Metrics and structured tracing via `tracing`
//! - Graceful shutdown with ingress drain
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use junction::{
//!     GatewayService,
//!     adapters::{InMemoryRegistry, PooledClientFactory},
//!     config::GatewayConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(GatewayConfig::default());
//! let registry = Arc::new(InMemoryRegistry::new());
//! let gateway = Arc::new(GatewayService::new(
//!     config,
//!     registry.clone(),
//!     Arc::new(PooledClientFactory::new()),
//! ));
//! // You would normally wire this into the Axum router (see binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error type.
//! Dispatch failures surface to HTTP clients as a JSON error envelope with a
//! stable `errorCode`.
//!
//! # Concurrency & Data Structures
//! For shared mutable maps the project uses `scc::HashMap` instead of
//! `dashmap` to maintain predictable performance characteristics under
//! contention.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{GatewayHandler, InMemoryRegistry, PooledClientFactory},
    core::{CircuitBreaker, EndpointCache, GatewayService, IngressGate, RegistryClient},
    ports::{http_client::HttpClient, registry::{ServiceRecord, ServiceRegistry, ServiceStatus}},
    utils::GracefulShutdown,
};
