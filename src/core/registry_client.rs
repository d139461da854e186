//! Registry client with the per-process publish discipline.
//!
//! A process announces at most one record at a time. Republishing first
//! withdraws the previous record, and the two steps are serialized behind one
//! lock so a republish can never leave both records live. Shutdown withdraws
//! whatever is still published.
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::ports::registry::{RegistryResult, ServiceRecord, ServiceRegistry};

/// Publish/unpublish front-end over a [`ServiceRegistry`] backend.
pub struct RegistryClient {
    registry: Arc<dyn ServiceRegistry>,
    published: Mutex<Option<ServiceRecord>>,
}

impl RegistryClient {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            registry,
            published: Mutex::new(None),
        }
    }

    /// Announce an HTTP endpoint under `name`, replacing any record this
    /// client published before.
    pub async fn publish_http_endpoint(
        &self,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        root: impl Into<String>,
    ) -> RegistryResult<ServiceRecord> {
        self.publish(ServiceRecord::http_endpoint(name, host, port, root))
            .await
    }

    /// Publish `record`, withdrawing the previously published record first.
    ///
    /// The unpublish must complete before the new publish starts; a failure
    /// there aborts the republish.
    pub async fn publish(&self, record: ServiceRecord) -> RegistryResult<ServiceRecord> {
        record.validate()?;

        let mut published = self.published.lock().await;
        if let Some(prior) = published.take() {
            self.withdraw(prior).await?;
        }

        let record = self.registry.publish(record).await?;
        tracing::info!(
            service = %record.name,
            endpoint = %record.origin(),
            registration = ?record.registration,
            "Published service endpoint"
        );
        *published = Some(record.clone());
        Ok(record)
    }

    /// Withdraw the currently published record, if any.
    pub async fn unpublish(&self) -> RegistryResult<()> {
        let mut published = self.published.lock().await;
        match published.take() {
            Some(record) => self.withdraw(record).await,
            None => Ok(()),
        }
    }

    /// The record this client currently has live, if any.
    pub async fn published(&self) -> Option<ServiceRecord> {
        self.published.lock().await.clone()
    }

    async fn withdraw(&self, record: ServiceRecord) -> RegistryResult<()> {
        match record.registration {
            Some(registration) => {
                self.registry.unpublish(registration).await?;
                tracing::info!(
                    service = %record.name,
                    registration = %registration,
                    "Unpublished service endpoint"
                );
                Ok(())
            }
            None => {
                // Never published by a registry; nothing to withdraw
                tracing::debug!(service = %record.name, "Skipping unregistered record");
                Ok(())
            }
        }
    }
}
