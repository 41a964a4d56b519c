use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cached mapping from a logical capability name to the concrete
/// resource identifier and service endpoint that back it.
///
/// Bindings are soft-cacheable: staleness is tolerated up to a TTL,
/// after which a fresh discovery call is required before the binding
/// may back a new token acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityBinding {
    pub capability: String,
    pub resource: String,
    pub endpoint: String,
    pub discovered_at: DateTime<Utc>,
}

impl CapabilityBinding {
    pub fn new(
        capability: impl Into<String>,
        resource: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            capability: capability.into(),
            resource: resource.into(),
            endpoint: endpoint.into(),
            discovered_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        Utc::now() - self.discovered_at < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_binding() {
        let binding = CapabilityBinding::new("files", "https://files.test/", "https://files.test/v1");
        assert!(binding.is_fresh(Duration::hours(24)));
    }

    #[test]
    fn test_stale_binding() {
        let mut binding =
            CapabilityBinding::new("files", "https://files.test/", "https://files.test/v1");
        binding.discovered_at = Utc::now() - Duration::hours(25);
        assert!(!binding.is_fresh(Duration::hours(24)));
    }
}
