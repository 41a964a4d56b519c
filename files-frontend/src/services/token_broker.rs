use async_trait::async_trait;
use chrono::Duration;
use service_core::retry::{retry_call, RetryConfig};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::config::BrokerSettings;
use crate::models::TokenRecord;
use crate::services::error::BrokerError;
use crate::services::identity_client::{IdentityProvider, IssuedToken, ProviderFailure};
use crate::services::token_cache::TokenCache;

/// Result of a silent acquisition attempt.
///
/// Needing interaction is an expected, modeled outcome: the caller
/// reacts by initiating a redirect, so it must not travel the error path.
#[derive(Debug, Clone)]
pub enum SilentOutcome {
    Token(TokenRecord),
    NeedsInteractive,
}

/// Orchestrates silent token acquisition against the cache and the
/// identity provider, classifying failures along the way.
pub struct TokenBroker {
    cache: Arc<dyn TokenCache>,
    provider: Arc<dyn IdentityProvider>,
    skew: Duration,
    retry: RetryConfig,
}

impl TokenBroker {
    pub fn new(
        cache: Arc<dyn TokenCache>,
        provider: Arc<dyn IdentityProvider>,
        settings: &BrokerSettings,
    ) -> Self {
        Self {
            cache,
            provider,
            skew: Duration::seconds(settings.clock_skew_seconds),
            retry: RetryConfig {
                max_retries: settings.max_retries,
                initial_backoff: StdDuration::from_millis(settings.retry_backoff_ms),
                ..Default::default()
            },
        }
    }

    /// Obtain a token for (user, resource) without user involvement.
    ///
    /// A cached record still fresh inside the skew margin is returned
    /// with no network call. Otherwise the provider is asked to refresh;
    /// transient failures are retried up to the configured bound, and
    /// the cache is only mutated on success. No cache lock is held
    /// across the provider round-trip.
    pub async fn acquire_silent(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<SilentOutcome, BrokerError> {
        if resource.is_empty() {
            return Err(BrokerError::Configuration(
                "empty resource identifier".to_string(),
            ));
        }

        let cached = self.cache.lookup(user_id, resource).await?;

        if let Some(record) = &cached {
            if record.is_fresh(self.skew) {
                tracing::debug!(user_id, resource, "token cache hit");
                return Ok(SilentOutcome::Token(record.clone()));
            }
        }

        let refresh = cached.as_ref().and_then(|r| r.refresh_token.as_deref());

        let attempt = retry_call(&self.retry, "acquire_token_silent", || async {
            self.provider
                .acquire_silent(resource, user_id, refresh)
                .await
        })
        .await;

        match attempt {
            Ok(issued) => {
                let record = self.store_issued(user_id, resource, issued).await?;
                crate::services::metrics::observe_acquisition(resource, "refreshed");
                Ok(SilentOutcome::Token(record))
            }
            Err(ProviderFailure::InteractionRequired(reason)) => {
                tracing::info!(
                    user_id,
                    resource,
                    reason,
                    "silent acquisition needs user interaction"
                );
                crate::services::metrics::observe_acquisition(resource, "interactive");
                Ok(SilentOutcome::NeedsInteractive)
            }
            Err(ProviderFailure::Transient(message)) => {
                crate::services::metrics::observe_acquisition(resource, "transient_failure");
                Err(BrokerError::Transient {
                    service: "identity-provider",
                    message,
                })
            }
            Err(ProviderFailure::Configuration(message)) => {
                crate::services::metrics::observe_acquisition(resource, "configuration_failure");
                Err(BrokerError::Configuration(message))
            }
        }
    }

    /// Persist a freshly issued token, replacing any prior record whole.
    /// Also used by the callback path to seed the cache from a redeemed
    /// authorization code.
    pub async fn store_issued(
        &self,
        user_id: &str,
        resource: &str,
        issued: IssuedToken,
    ) -> Result<TokenRecord, BrokerError> {
        let record = TokenRecord::new(
            user_id,
            resource,
            issued.access_token,
            issued.refresh_token,
            issued.expires_in,
        );
        self.cache.store(&record).await?;
        Ok(record)
    }
}

/// Capability interface handed to downstream resource clients: one
/// operation, bound to the authenticated user at construction.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn current_token(&self, resource: &str) -> Result<String, BrokerError>;
}

/// Token provider backed by the broker's cache for one user.
///
/// By the time a downstream client runs, the flow controller has
/// already acquired every token it needs, so this normally resolves
/// from cache. A consent revoked in between surfaces as
/// `BrokerError::InteractionRequired`, which the flow controller turns
/// back into a redirect.
pub struct BrokerTokenProvider {
    broker: Arc<TokenBroker>,
    user_id: String,
}

impl BrokerTokenProvider {
    pub fn new(broker: Arc<TokenBroker>, user_id: impl Into<String>) -> Self {
        Self {
            broker,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for BrokerTokenProvider {
    async fn current_token(&self, resource: &str) -> Result<String, BrokerError> {
        match self.broker.acquire_silent(&self.user_id, resource).await? {
            SilentOutcome::Token(record) => Ok(record.access_token),
            SilentOutcome::NeedsInteractive => Err(BrokerError::InteractionRequired),
        }
    }
}
