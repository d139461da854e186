use std::net::SocketAddr;

use eyre::Result;

use crate::config::models::{CircuitBreakerConfig, GatewayConfig, IngressConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_api_prefix(&config.api_prefix) {
            errors.push(e);
        }

        if let Err(mut ingress_errors) = Self::validate_ingress(&config.ingress) {
            errors.append(&mut ingress_errors);
        }

        if let Err(mut breaker_errors) = Self::validate_circuit_breaker(&config.circuit_breaker) {
            errors.append(&mut breaker_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8787' or '0.0.0.0:8787')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate the API prefix shape
    fn validate_api_prefix(prefix: &str) -> ValidationResult<()> {
        if !prefix.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field: "api_prefix".to_string(),
                message: "Must start with '/'".to_string(),
            });
        }

        if !prefix.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field: "api_prefix".to_string(),
                message: "Must end with '/' so the service name is a full path segment"
                    .to_string(),
            });
        }

        Ok(())
    }

    fn validate_ingress(config: &IngressConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "ingress.capacity".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_circuit_breaker(config: &CircuitBreakerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.max_failures == 0 {
            errors.push(ValidationError::InvalidField {
                field: "circuit_breaker.max_failures".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.call_timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "circuit_breaker.call_timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.reset_timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "circuit_breaker.reset_timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default_config() {
        let config = GatewayConfig::default();
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_bad_listen_address() {
        let config = GatewayConfig {
            listen_addr: "not-an-address".to_string(),
            ..GatewayConfig::default()
        };
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_prefix_without_trailing_slash() {
        let config = GatewayConfig {
            api_prefix: "/api".to_string(),
            ..GatewayConfig::default()
        };
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = GatewayConfig::default();
        config.ingress.capacity = 0;
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_collects_every_error() {
        let mut config = GatewayConfig {
            listen_addr: "nope".to_string(),
            api_prefix: "api/".to_string(),
            ..GatewayConfig::default()
        };
        config.circuit_breaker.max_failures = 0;
        config.circuit_breaker.call_timeout_ms = 0;

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("4 validation errors"), "{message}");
    }
}
