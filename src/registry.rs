//! C5: in-memory route table the proxy gateway reads on every request.
//!
//! Grounded on `original_source/mcp_guardian/app/services/route_registry.py`
//! for the two-map shape, and on the teacher's pervasive `Arc<RwLock<_>>`
//! sharing pattern (`server/http_server.rs`'s `Arc<Mutex<McpServer>>`) for how
//! a single mutable core gets fanned out across axum handlers. The read path
//! never awaits anything but the lock itself — no network I/O is ever run
//! while holding it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::store::models::Service;

/// One atomically-swapped view of the route table: every enabled service's
/// name maps to its upstream URL. Disabled and unknown services are simply
/// absent, so `enabled()`/`upstream_for()` degenerate to one `HashMap::get`.
#[derive(Debug, Default, Clone)]
struct RegistrySnapshot {
    /// Every known service name, enabled or not — lets the proxy distinguish
    /// "unknown service" (404) from "known but disabled" (403).
    all: HashMap<String, ()>,
    enabled: HashMap<String, String>,
}

/// Shared, swappable route table. Cheap to clone (`Arc` internally); clone it
/// freely into axum `State`.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    inner: Arc<RwLock<RegistrySnapshot>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistrySnapshot::default())),
        }
    }

    /// Rebuild the whole table from the current `services` rows. Builds the
    /// replacement off to the side and swaps it in under one write lock —
    /// readers never observe a partially-rebuilt table.
    pub async fn reload(&self, services: &[Service]) {
        let mut all = HashMap::with_capacity(services.len());
        let mut enabled = HashMap::new();
        for service in services {
            all.insert(service.name.clone(), ());
            if service.enabled {
                enabled.insert(service.name.clone(), service.upstream_url.clone());
            }
        }
        let snapshot = RegistrySnapshot { all, enabled };
        *self.inner.write().await = snapshot;
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.inner.read().await.all.contains_key(name)
    }

    pub async fn enabled(&self, name: &str) -> bool {
        self.inner.read().await.enabled.contains_key(name)
    }

    pub async fn upstream_for(&self, name: &str) -> Option<String> {
        self.inner.read().await.enabled.get(name).cloned()
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service(name: &str, upstream_url: &str, enabled: bool) -> Service {
        Service {
            id: 1,
            name: name.to_string(),
            upstream_url: upstream_url.to_string(),
            enabled,
            check_frequency_minutes: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_service_is_absent_everywhere() {
        let registry = RouteRegistry::new();
        assert!(!registry.exists("fs").await);
        assert!(!registry.enabled("fs").await);
        assert!(registry.upstream_for("fs").await.is_none());
    }

    #[tokio::test]
    async fn disabled_service_exists_but_has_no_route() {
        let registry = RouteRegistry::new();
        registry
            .reload(&[service("fs", "http://u1", false)])
            .await;

        assert!(registry.exists("fs").await);
        assert!(!registry.enabled("fs").await);
        assert!(registry.upstream_for("fs").await.is_none());
    }

    #[tokio::test]
    async fn enabled_service_resolves_its_upstream() {
        let registry = RouteRegistry::new();
        registry.reload(&[service("fs", "http://u1", true)]).await;

        assert!(registry.enabled("fs").await);
        assert_eq!(registry.upstream_for("fs").await.as_deref(), Some("http://u1"));
    }

    #[tokio::test]
    async fn reload_fully_replaces_the_previous_table() {
        let registry = RouteRegistry::new();
        registry.reload(&[service("fs", "http://u1", true)]).await;
        registry.reload(&[service("git", "http://u2", true)]).await;

        assert!(!registry.exists("fs").await);
        assert!(registry.exists("git").await);
    }
}
