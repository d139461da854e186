//! In-memory registry backend.
//!
//! Stores published records in a concurrent map keyed by registration id.
//! This suits a single-process deployment and tests; a clustered backend can
//! implement [`ServiceRegistry`] against an external store without touching
//! the rest of the gateway.
use async_trait::async_trait;
use scc::HashMap;
use uuid::Uuid;

use crate::{
    metrics::set_registry_records,
    ports::registry::{
        RegistryError, RegistryResult, ServiceRecord, ServiceRegistry, ServiceStatus,
    },
};

/// Process-local implementation of the registry port.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: HashMap<Uuid, ServiceRecord>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn lookup(&self, service_name: &str) -> RegistryResult<ServiceRecord> {
        let mut found = None;
        self.records
            .scan_async(|_, record| {
                if found.is_none()
                    && record.name == service_name
                    && record.status == ServiceStatus::Up
                {
                    found = Some(record.clone());
                }
            })
            .await;

        found.ok_or_else(|| RegistryError::NotFound(service_name.to_string()))
    }

    async fn publish(&self, record: ServiceRecord) -> RegistryResult<ServiceRecord> {
        record.validate()?;

        let registration = Uuid::new_v4();
        let mut record = record;
        record.registration = Some(registration);

        if self
            .records
            .insert_async(registration, record.clone())
            .await
            .is_err()
        {
            // A v4 collision would mean the id is already registered
            return Err(RegistryError::Unavailable(format!(
                "Registration id collision: {registration}"
            )));
        }

        set_registry_records(self.records.len());
        tracing::info!(
            service = %record.name,
            registration = %registration,
            endpoint = %record.origin(),
            "Service published"
        );
        Ok(record)
    }

    async fn unpublish(&self, registration: Uuid) -> RegistryResult<()> {
        let Some((_, record)) = self.records.remove_async(&registration).await else {
            return Err(RegistryError::UnknownRegistration(registration));
        };

        set_registry_records(self.records.len());
        tracing::info!(service = %record.name, %registration, "Service unpublished");
        Ok(())
    }

    async fn records(&self) -> RegistryResult<Vec<ServiceRecord>> {
        let mut all = Vec::new();
        self.records
            .scan_async(|_, record| all.push(record.clone()))
            .await;
        Ok(all)
    }
}
