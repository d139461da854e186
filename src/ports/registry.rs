use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Custom error type for service registry operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    /// No live record exists for the requested service name
    #[error("Service [{0}] not published")]
    NotFound(String),

    /// The registration id does not correspond to a published record
    #[error("Unknown registration: {0}")]
    UnknownRegistration(Uuid),

    /// The record is malformed (bad port, empty name, ...)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Communication with the registry backend failed
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Lifecycle status of a published record.
///
/// Only `Up` records are considered live by `lookup`; a `Down` record is
/// invisible to dispatch until its owner republishes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Up,
    Down,
}

/// A service endpoint announcement: where one named HTTP service can be
/// reached.
///
/// `registration` is assigned by the registry when the record is published
/// and is the key used to unpublish it later. A record built locally via
/// [`ServiceRecord::http_endpoint`] has no registration yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Logical service name, the first path segment after the API prefix
    pub name: String,
    /// Host or IP the service listens on
    pub host: String,
    /// TCP port, 1..=65535
    pub port: u16,
    /// Path prefix the service serves under ("/" for none)
    #[serde(default = "default_root")]
    pub root: String,
    /// Whether the record is live
    #[serde(default = "default_status")]
    pub status: ServiceStatus,
    /// Registry-assigned id, present once published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<Uuid>,
}

fn default_root() -> String {
    "/".to_string()
}

fn default_status() -> ServiceStatus {
    ServiceStatus::Up
}

impl ServiceRecord {
    /// Build an unpublished record for an HTTP endpoint.
    pub fn http_endpoint(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        root: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            root: root.into(),
            status: ServiceStatus::Up,
            registration: None,
        }
    }

    /// Origin of the endpoint, e.g. `http://10.0.0.3:8086`.
    pub fn origin(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Validate the record before it reaches a registry backend.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidRecord(
                "service name must not be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(RegistryError::InvalidRecord(
                "host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(RegistryError::InvalidRecord(
                "port must be in 1..=65535".to_string(),
            ));
        }
        if !self.root.starts_with('/') {
            return Err(RegistryError::InvalidRecord(format!(
                "root must start with '/': {}",
                self.root
            )));
        }
        Ok(())
    }
}

/// ServiceRegistry defines the port (interface) for the discovery backend.
///
/// The backend stores published records keyed by registration id. Duplicate
/// names may coexist at this level; the one-record-per-process discipline is
/// enforced client-side by `RegistryClient`.
#[async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Resolve a service name to its live record.
    ///
    /// Returns `RegistryError::NotFound` when no `Up` record matches.
    async fn lookup(&self, service_name: &str) -> RegistryResult<ServiceRecord>;

    /// Publish a record, returning it with `registration` assigned.
    async fn publish(&self, record: ServiceRecord) -> RegistryResult<ServiceRecord>;

    /// Withdraw a previously published record.
    async fn unpublish(&self, registration: Uuid) -> RegistryResult<()>;

    /// Snapshot of every stored record, live or not.
    async fn records(&self) -> RegistryResult<Vec<ServiceRecord>>;
}
