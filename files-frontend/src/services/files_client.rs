use async_trait::async_trait;
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::sync::Arc;

use crate::models::{CapabilityBinding, FileItem};
use crate::services::error::BrokerError;
use crate::services::token_broker::TokenProvider;

/// Capability-scoped file listing API. The endpoint is only known after
/// discovery, so it travels with each call rather than the client.
#[async_trait]
pub trait FilesApi: Send + Sync {
    /// First page of the user's files.
    async fn list_items(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<Vec<FileItem>, BrokerError>;
}

#[derive(Debug, Deserialize)]
struct FilesPageResponse {
    value: Vec<FileItem>,
}

pub struct HttpFilesClient {
    client: reqwest::Client,
}

impl HttpFilesClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFilesClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FilesApi for HttpFilesClient {
    async fn list_items(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<Vec<FileItem>, BrokerError> {
        let url = format!("{}/files", endpoint.trim_end_matches('/'));

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Transient {
                service: "files",
                message: format!("files endpoint unreachable: {}", e),
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BrokerError::Transient {
                service: "files",
                message: format!("files endpoint returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(BrokerError::Configuration(format!(
                "files listing rejected with {}",
                status
            )));
        }

        let body: FilesPageResponse =
            response.json().await.map_err(|e| BrokerError::Transient {
                service: "files",
                message: format!("malformed files response: {}", e),
            })?;

        Ok(body.value)
    }
}

/// Files client bound to a resolved capability binding, with tokens
/// supplied by the injected provider.
pub struct FilesClient {
    api: Arc<dyn FilesApi>,
    provider: Arc<dyn TokenProvider>,
    binding: CapabilityBinding,
}

impl FilesClient {
    pub fn new(
        api: Arc<dyn FilesApi>,
        provider: Arc<dyn TokenProvider>,
        binding: CapabilityBinding,
    ) -> Self {
        Self {
            api,
            provider,
            binding,
        }
    }

    pub async fn list_items(&self) -> Result<Vec<FileItem>, BrokerError> {
        let token = self.provider.current_token(&self.binding.resource).await?;
        self.api.list_items(&self.binding.endpoint, &token).await
    }
}

/// Scripted files API for tests.
#[derive(Default)]
pub struct MockFilesApi {
    items: std::sync::Mutex<Vec<FileItem>>,
    fail: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockFilesApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, items: Vec<FileItem>) -> Self {
        *self.items.lock().expect("mock files mutex poisoned") = items;
        self
    }

    /// Make subsequent calls fail with a transient error.
    pub fn failing(self) -> Self {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl FilesApi for MockFilesApi {
    async fn list_items(
        &self,
        _endpoint: &str,
        _access_token: &str,
    ) -> Result<Vec<FileItem>, BrokerError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BrokerError::Transient {
                service: "files",
                message: "scripted failure".to_string(),
            });
        }

        Ok(self.items.lock().expect("mock files mutex poisoned").clone())
    }
}
