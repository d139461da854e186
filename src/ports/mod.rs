pub mod http_client;
pub mod registry;

pub use http_client::{HttpClient, HttpClientError, HttpClientFactory, HttpClientResult};
pub use registry::{RegistryError, RegistryResult, ServiceRecord, ServiceRegistry, ServiceStatus};
