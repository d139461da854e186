//! Memoized service endpoints.
//!
//! Resolving a service name (registry lookup plus client construction) is
//! expensive enough to do once, not per request. The cache holds at most one
//! handle per service name and hands out clones of the `Arc`; invalidation
//! removes the entry, and the handle's connections close when the last
//! in-flight dispatch drops its reference.
use std::sync::Arc;

use crate::ports::{
    HttpClient, HttpClientFactory,
    registry::{RegistryError, RegistryResult, ServiceRecord, ServiceRegistry},
};

/// A resolved service endpoint: one record bound to one dedicated client.
pub struct EndpointHandle {
    record: ServiceRecord,
    client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHandle")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl EndpointHandle {
    pub fn new(record: ServiceRecord, client: Arc<dyn HttpClient>) -> Self {
        Self { record, client }
    }

    /// The registry record this handle was resolved from.
    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// The dedicated client for this endpoint.
    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Absolute-form URI for a dispatch, joining the record's path root with
    /// the service URI. A root of "/" contributes nothing.
    pub fn request_uri(&self, service_uri: &str) -> String {
        let root = self.record.root.trim_end_matches('/');
        format!("{}{}{}", self.record.origin(), root, service_uri)
    }
}

/// Per-service endpoint cache backed by the registry.
pub struct EndpointCache {
    registry: Arc<dyn ServiceRegistry>,
    client_factory: Arc<dyn HttpClientFactory>,
    entries: scc::HashMap<String, Arc<EndpointHandle>>,
}

impl EndpointCache {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        client_factory: Arc<dyn HttpClientFactory>,
    ) -> Self {
        Self {
            registry,
            client_factory,
            entries: scc::HashMap::new(),
        }
    }

    /// Return the cached handle for `service_name`, resolving and storing
    /// one on a miss.
    pub async fn get(&self, service_name: &str) -> RegistryResult<Arc<EndpointHandle>> {
        if let Some(handle) = self
            .entries
            .get_async(service_name)
            .await
            .map(|entry| entry.get().clone())
        {
            return Ok(handle);
        }

        let record = self.registry.lookup(service_name).await?;
        let client = self.client_factory.create().map_err(|e| {
            RegistryError::Unavailable(format!("failed to build endpoint client: {e}"))
        })?;
        let handle = Arc::new(EndpointHandle::new(record, client));

        tracing::debug!(
            service = %service_name,
            endpoint = %handle.record().origin(),
            "Cached resolved service endpoint"
        );

        // Racing resolutions may briefly produce two handles; the loser keeps
        // serving its own request and drops with it.
        let _ = self
            .entries
            .insert_async(service_name.to_string(), handle.clone())
            .await;

        Ok(handle)
    }

    /// Drop the cached handle for `service_name`.
    ///
    /// Returns whether an entry was removed. In-flight dispatches keep their
    /// clone of the handle until they finish.
    pub fn invalidate(&self, service_name: &str) -> bool {
        let removed = self.entries.remove(service_name).is_some();
        if removed {
            tracing::info!(service = %service_name, "Invalidated cached service endpoint");
        }
        removed
    }

    /// Whether a handle is currently cached for `service_name`.
    pub fn contains(&self, service_name: &str) -> bool {
        self.entries.read(service_name, |_, _| ()).is_some()
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached handle. Used at shutdown.
    pub async fn clear(&self) {
        self.entries.retain_async(|_, _| false).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use hyper::{Request, Response};
    use uuid::Uuid;

    use super::*;
    use crate::ports::{HttpClientResult, registry::ServiceStatus};

    struct MockRegistry {
        record: Option<ServiceRecord>,
        lookups: AtomicU32,
    }

    impl MockRegistry {
        fn with_record(record: ServiceRecord) -> Self {
            Self {
                record: Some(record),
                lookups: AtomicU32::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                record: None,
                lookups: AtomicU32::new(0),
            }
        }

        fn lookup_count(&self) -> u32 {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServiceRegistry for MockRegistry {
        async fn lookup(&self, service_name: &str) -> RegistryResult<ServiceRecord> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.record
                .clone()
                .ok_or_else(|| RegistryError::NotFound(service_name.to_string()))
        }

        async fn publish(&self, mut record: ServiceRecord) -> RegistryResult<ServiceRecord> {
            record.registration = Some(Uuid::new_v4());
            Ok(record)
        }

        async fn unpublish(&self, _registration: Uuid) -> RegistryResult<()> {
            Ok(())
        }

        async fn records(&self) -> RegistryResult<Vec<ServiceRecord>> {
            Ok(self.record.clone().into_iter().collect())
        }
    }

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Ok(Response::new(AxumBody::empty()))
        }
    }

    struct MockClientFactory {
        created: AtomicU32,
    }

    impl MockClientFactory {
        fn new() -> Self {
            Self {
                created: AtomicU32::new(0),
            }
        }
    }

    impl HttpClientFactory for MockClientFactory {
        fn create(&self) -> HttpClientResult<Arc<dyn HttpClient>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockHttpClient))
        }
    }

    fn orders_record() -> ServiceRecord {
        ServiceRecord {
            name: "orders".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8086,
            root: "/".to_string(),
            status: ServiceStatus::Up,
            registration: Some(Uuid::new_v4()),
        }
    }

    fn cache_with(registry: Arc<MockRegistry>) -> EndpointCache {
        EndpointCache::new(registry, Arc::new(MockClientFactory::new()))
    }

    #[tokio::test]
    async fn test_get_resolves_once_and_caches() {
        let registry = Arc::new(MockRegistry::with_record(orders_record()));
        let cache = cache_with(registry.clone());

        let first = cache.get("orders").await.unwrap();
        let second = cache.get("orders").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.lookup_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_propagates_not_found() {
        let registry = Arc::new(MockRegistry::empty());
        let cache = cache_with(registry);

        let error = cache.get("orders").await.unwrap_err();
        assert!(matches!(error, RegistryError::NotFound(name) if name == "orders"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_resolution() {
        let registry = Arc::new(MockRegistry::with_record(orders_record()));
        let cache = cache_with(registry.clone());

        let stale = cache.get("orders").await.unwrap();
        assert!(cache.invalidate("orders"));
        assert!(!cache.contains("orders"));

        let fresh = cache.get("orders").await.unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(registry.lookup_count(), 2);

        // The stale handle stays usable for whoever still holds it
        assert_eq!(stale.record().name, "orders");
    }

    #[tokio::test]
    async fn test_invalidate_missing_entry_is_noop() {
        let cache = cache_with(Arc::new(MockRegistry::empty()));
        assert!(!cache.invalidate("orders"));
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let registry = Arc::new(MockRegistry::with_record(orders_record()));
        let cache = cache_with(registry);

        cache.get("orders").await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty());
    }

    #[test]
    fn test_request_uri_joins_root() {
        let client: Arc<dyn HttpClient> = Arc::new(MockHttpClient);

        let plain = EndpointHandle::new(orders_record(), client.clone());
        assert_eq!(plain.request_uri("/list?page=2"), "http://127.0.0.1:8086/list?page=2");
        assert_eq!(plain.request_uri("/"), "http://127.0.0.1:8086/");

        let mut rooted_record = orders_record();
        rooted_record.root = "/v1/".to_string();
        let rooted = EndpointHandle::new(rooted_record, client);
        assert_eq!(rooted.request_uri("/list"), "http://127.0.0.1:8086/v1/list");
    }
}
