//! Ingress admission control and service path parsing.
//!
//! The gate bounds how many requests may be in flight at once. Admission
//! never waits: a saturated gate sheds the request immediately so the caller
//! gets a fast 503 instead of a queue slot. A permit is held for the life of
//! the request and returns to the gate when the response completes.
use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::metrics::record_ingress_rejection;

/// Bounded admission gate for inbound requests.
#[derive(Debug, Clone)]
pub struct IngressGate {
    capacity: usize,
    permits: Arc<Semaphore>,
}

/// RAII admission permit; dropping it frees a slot.
#[derive(Debug)]
pub struct IngressPermit {
    _permit: OwnedSemaphorePermit,
}

impl IngressGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Admit a request, or shed it when the gate is saturated.
    pub fn try_admit(&self) -> Option<IngressPermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Some(IngressPermit { _permit: permit }),
            Err(_) => {
                record_ingress_rejection();
                tracing::warn!(
                    capacity = self.capacity,
                    "Ingress saturated, shedding request"
                );
                None
            }
        }
    }

    /// Requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Wait until every permit has been returned, up to `timeout`.
    ///
    /// Returns whether the gate fully drained. Used at shutdown after the
    /// listener stops accepting connections.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let all = self.permits.acquire_many(self.capacity as u32);
        match tokio::time::timeout(timeout, all).await {
            Ok(Ok(_permit)) => true,
            // Semaphore is never closed, so an inner error cannot happen; a
            // timeout means requests were still in flight
            _ => false,
        }
    }
}

/// A parsed service dispatch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePath {
    /// First path segment after the API prefix; may be empty
    pub service_name: String,
    /// Remainder of the path (default "/") with the query string appended
    pub service_uri: String,
}

/// Split a request path under `api_prefix` into service name and service URI.
///
/// Returns `None` for paths outside the prefix. An empty service name is
/// returned as-is so the caller can reject it; the registry is never
/// consulted for it.
pub fn parse_service_path(path: &str, query: Option<&str>, api_prefix: &str) -> Option<ServicePath> {
    let remainder = path.strip_prefix(api_prefix)?;

    let (service_name, rest) = match remainder.find('/') {
        Some(idx) => (&remainder[..idx], &remainder[idx..]),
        None => (remainder, ""),
    };

    let mut service_uri = if rest.is_empty() {
        "/".to_string()
    } else {
        rest.to_string()
    };
    if let Some(query) = query {
        service_uri.push('?');
        service_uri.push_str(query);
    }

    Some(ServicePath {
        service_name: service_name.to_string(),
        service_uri,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_admits_up_to_capacity() {
        let gate = IngressGate::new(2);

        let first = gate.try_admit();
        let second = gate.try_admit();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(gate.in_flight(), 2);

        // Saturated: next request is shed
        assert!(gate.try_admit().is_none());

        drop(first);
        assert_eq!(gate.in_flight(), 1);
        assert!(gate.try_admit().is_some());
    }

    #[tokio::test]
    async fn test_wait_for_drain_times_out_while_busy() {
        let gate = IngressGate::new(2);
        let held = gate.try_admit().unwrap();

        assert!(!gate.wait_for_drain(Duration::from_millis(30)).await);

        drop(held);
        assert!(gate.wait_for_drain(Duration::from_millis(30)).await);
        // Draining must not consume capacity
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn test_parse_basic_dispatch_path() {
        let parsed = parse_service_path("/api/orders/list/all", None, "/api/").unwrap();
        assert_eq!(parsed.service_name, "orders");
        assert_eq!(parsed.service_uri, "/list/all");
    }

    #[test]
    fn test_parse_bare_service_name_defaults_uri() {
        let parsed = parse_service_path("/api/orders", None, "/api/").unwrap();
        assert_eq!(parsed.service_name, "orders");
        assert_eq!(parsed.service_uri, "/");
    }

    #[test]
    fn test_parse_appends_query_string() {
        let parsed = parse_service_path("/api/orders/list", Some("page=2&full=1"), "/api/").unwrap();
        assert_eq!(parsed.service_uri, "/list?page=2&full=1");

        let bare = parse_service_path("/api/orders", Some("page=2"), "/api/").unwrap();
        assert_eq!(bare.service_uri, "/?page=2");
    }

    #[test]
    fn test_parse_outside_prefix_is_none() {
        assert!(parse_service_path("/health", None, "/api/").is_none());
        assert!(parse_service_path("/apiX/orders", None, "/api/").is_none());
        assert!(parse_service_path("/api", None, "/api/").is_none());
    }

    #[test]
    fn test_parse_keeps_empty_service_name_for_rejection() {
        let parsed = parse_service_path("/api/", None, "/api/").unwrap();
        assert_eq!(parsed.service_name, "");

        let trailing = parse_service_path("/api//list", None, "/api/").unwrap();
        assert_eq!(trailing.service_name, "");
        assert_eq!(trailing.service_uri, "/list");
    }
}
