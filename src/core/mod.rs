pub mod circuit_breaker;
pub mod dispatcher;
pub mod endpoint_cache;
pub mod gateway;
pub mod ingress;
pub mod registry_client;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use endpoint_cache::EndpointCache;
pub use gateway::GatewayService;
pub use ingress::IngressGate;
pub use registry_client::RegistryClient;
