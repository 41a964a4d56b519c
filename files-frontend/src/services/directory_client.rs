use async_trait::async_trait;
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::sync::Arc;

use crate::config::DirectorySettings;
use crate::models::UserProfile;
use crate::services::error::BrokerError;
use crate::services::token_broker::TokenProvider;

/// Directory/profile service collaborator.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn lookup_user(
        &self,
        object_id: &str,
        access_token: &str,
    ) -> Result<UserProfile, BrokerError>;
}

#[derive(Debug, Deserialize)]
struct DirectoryUserResponse {
    display_name: String,
    #[serde(default)]
    mail: Option<String>,
}

pub struct HttpDirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectoryClient {
    pub fn new(settings: &DirectorySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DirectoryApi for HttpDirectoryClient {
    async fn lookup_user(
        &self,
        object_id: &str,
        access_token: &str,
    ) -> Result<UserProfile, BrokerError> {
        let url = format!("{}/users/{}", self.base_url, object_id);

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Transient {
                service: "directory",
                message: format!("directory service unreachable: {}", e),
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BrokerError::Transient {
                service: "directory",
                message: format!("directory service returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(BrokerError::Configuration(format!(
                "directory lookup for {} rejected with {}",
                object_id, status
            )));
        }

        let body: DirectoryUserResponse =
            response.json().await.map_err(|e| BrokerError::Transient {
                service: "directory",
                message: format!("malformed directory response: {}", e),
            })?;

        Ok(UserProfile {
            display_name: body.display_name,
            mail: body.mail,
        })
    }
}

/// Directory client bound to its resource identifier, with tokens
/// supplied by the injected provider.
pub struct DirectoryClient {
    api: Arc<dyn DirectoryApi>,
    provider: Arc<dyn TokenProvider>,
    resource: String,
}

impl DirectoryClient {
    pub fn new(
        api: Arc<dyn DirectoryApi>,
        provider: Arc<dyn TokenProvider>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            api,
            provider,
            resource: resource.into(),
        }
    }

    pub async fn lookup_user(&self, object_id: &str) -> Result<UserProfile, BrokerError> {
        let token = self.provider.current_token(&self.resource).await?;
        self.api.lookup_user(object_id, &token).await
    }
}

/// Mock directory with a fixed set of profiles.
#[derive(Default)]
pub struct MockDirectory {
    profiles: std::sync::Mutex<std::collections::HashMap<String, UserProfile>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, object_id: &str, profile: UserProfile) -> Self {
        self.profiles
            .lock()
            .expect("mock directory mutex poisoned")
            .insert(object_id.to_string(), profile);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryApi for MockDirectory {
    async fn lookup_user(
        &self,
        object_id: &str,
        _access_token: &str,
    ) -> Result<UserProfile, BrokerError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        self.profiles
            .lock()
            .expect("mock directory mutex poisoned")
            .get(object_id)
            .cloned()
            .ok_or_else(|| BrokerError::Configuration(format!("unknown user {}", object_id)))
    }
}
