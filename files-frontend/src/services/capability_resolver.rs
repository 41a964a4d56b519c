use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::sync::Arc;

use crate::config::DiscoverySettings;
use crate::models::CapabilityBinding;
use crate::services::error::BrokerError;

/// Capability discovery collaborator.
#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    async fn discover_capability(
        &self,
        name: &str,
        access_token: &str,
    ) -> Result<CapabilityBinding, BrokerError>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    service_resource_id: String,
    service_endpoint_uri: String,
}

pub struct HttpDiscoveryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscoveryClient {
    pub fn new(settings: &DiscoverySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DiscoveryApi for HttpDiscoveryClient {
    async fn discover_capability(
        &self,
        name: &str,
        access_token: &str,
    ) -> Result<CapabilityBinding, BrokerError> {
        let url = format!("{}/capabilities/{}", self.base_url, name);

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Resolution {
                capability: name.to_string(),
                message: format!("discovery service unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(BrokerError::Resolution {
                capability: name.to_string(),
                message: format!("discovery service returned {}", response.status()),
            });
        }

        let body: DiscoveryResponse =
            response.json().await.map_err(|e| BrokerError::Resolution {
                capability: name.to_string(),
                message: format!("malformed discovery response: {}", e),
            })?;

        Ok(CapabilityBinding::new(
            name,
            body.service_resource_id,
            body.service_endpoint_uri,
        ))
    }
}

/// Resolves logical capability names to concrete resource identifiers
/// and endpoints, caching bindings up to a TTL.
///
/// Discovery failures are not retried here; they usually indicate
/// configuration problems, so retry policy belongs to the caller.
pub struct CapabilityResolver {
    discovery: Arc<dyn DiscoveryApi>,
    bindings: DashMap<String, CapabilityBinding>,
    ttl: Duration,
}

impl CapabilityResolver {
    pub fn new(discovery: Arc<dyn DiscoveryApi>, ttl: Duration) -> Self {
        Self {
            discovery,
            bindings: DashMap::new(),
            ttl,
        }
    }

    /// Seed the cache with a pre-built binding (tests use this to plant
    /// fresh or stale entries).
    pub fn prime(&self, binding: CapabilityBinding) {
        self.bindings.insert(binding.capability.clone(), binding);
    }

    pub async fn resolve(
        &self,
        name: &str,
        discovery_token: &str,
    ) -> Result<CapabilityBinding, BrokerError> {
        if let Some(binding) = self.bindings.get(name) {
            if binding.is_fresh(self.ttl) {
                tracing::debug!(capability = name, "capability binding cache hit");
                return Ok(binding.clone());
            }
        }

        let binding = self
            .discovery
            .discover_capability(name, discovery_token)
            .await?;

        tracing::info!(
            capability = name,
            endpoint = %binding.endpoint,
            "discovered capability binding"
        );

        self.bindings.insert(name.to_string(), binding.clone());
        Ok(binding)
    }
}

/// Scripted discovery service with a call counter.
#[derive(Default)]
pub struct MockDiscovery {
    bindings: std::sync::Mutex<std::collections::HashMap<String, CapabilityBinding>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(self, binding: CapabilityBinding) -> Self {
        self.bindings
            .lock()
            .expect("mock discovery mutex poisoned")
            .insert(binding.capability.clone(), binding);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryApi for MockDiscovery {
    async fn discover_capability(
        &self,
        name: &str,
        _access_token: &str,
    ) -> Result<CapabilityBinding, BrokerError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        self.bindings
            .lock()
            .expect("mock discovery mutex poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::Resolution {
                capability: name.to_string(),
                message: "unknown capability".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn binding(name: &str) -> CapabilityBinding {
        CapabilityBinding::new(name, "https://files.test/", "https://files.test/v1")
    }

    #[tokio::test]
    async fn test_fresh_binding_skips_discovery() {
        let discovery = Arc::new(MockDiscovery::new().with_capability(binding("files")));
        let resolver = CapabilityResolver::new(discovery.clone(), Duration::hours(24));

        resolver.prime(binding("files"));

        let resolved = resolver.resolve("files", "token").await.unwrap();
        assert_eq!(resolved.endpoint, "https://files.test/v1");
        assert_eq!(discovery.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_binding_rediscovered_once() {
        let discovery = Arc::new(MockDiscovery::new().with_capability(binding("files")));
        let resolver = CapabilityResolver::new(discovery.clone(), Duration::hours(24));

        let mut stale = binding("files");
        stale.discovered_at = Utc::now() - Duration::hours(25);
        resolver.prime(stale);

        resolver.resolve("files", "token").await.unwrap();
        assert_eq!(discovery.call_count(), 1);

        // Re-resolved binding is fresh again; no further discovery.
        resolver.resolve("files", "token").await.unwrap();
        assert_eq!(discovery.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_capability_surfaces_resolution_error() {
        let discovery = Arc::new(MockDiscovery::new());
        let resolver = CapabilityResolver::new(discovery, Duration::hours(24));

        let err = resolver.resolve("calendar", "token").await.unwrap_err();
        assert!(matches!(err, BrokerError::Resolution { .. }));
    }
}
