//! Configuration data structures for Junction.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! intentionally serde‑friendly and include defaults so that minimal configs remain concise.
//! Builders and enums here are considered part of the public API for embedding.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default function for the API prefix
fn default_api_prefix() -> String {
    "/api/".to_string()
}

/// Admission control settings for the ingress layer.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IngressConfig {
    /// Maximum number of requests in flight before load shedding kicks in
    pub capacity: usize,
    /// How long shutdown waits for in-flight requests to drain (seconds)
    pub drain_timeout_secs: u64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            drain_timeout_secs: 30,
        }
    }
}

/// Per-service circuit breaker settings.
///
/// One breaker is created per service name with these parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker open
    pub max_failures: u32,
    /// Upper bound on a single dispatch, in milliseconds
    pub call_timeout_ms: u64,
    /// Time the breaker stays open before allowing a half-open trial, in milliseconds
    pub reset_timeout_ms: u64,
    /// Invoke the fallback for every failure, not only open-circuit rejections
    pub fallback_on_failure: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            call_timeout_ms: 5_000,
            reset_timeout_ms: 10_000,
            fallback_on_failure: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Reset timeout as a [`Duration`].
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on, e.g. "127.0.0.1:8787"
    pub listen_addr: String,
    /// Path prefix that marks a request as a service dispatch
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Ingress drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.ingress.drain_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8787".to_string(),
            api_prefix: default_api_prefix(),
            ingress: IngressConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    api_prefix: Option<String>,
    ingress: Option<IngressConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the API prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = Some(prefix.into());
        self
    }

    /// Set the ingress admission capacity
    pub fn ingress_capacity(mut self, capacity: usize) -> Self {
        self.ingress.get_or_insert_with(IngressConfig::default).capacity = capacity;
        self
    }

    /// Set circuit breaker settings
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        Ok(GatewayConfig {
            listen_addr,
            api_prefix: self.api_prefix.unwrap_or_else(default_api_prefix),
            ingress: self.ingress.unwrap_or_default(),
            circuit_breaker: self.circuit_breaker.unwrap_or_default(),
        })
    }
}
