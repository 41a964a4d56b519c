use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::config::Settings;
use crate::models::{FileItem, UserProfile};
use crate::services::capability_resolver::CapabilityResolver;
use crate::services::directory_client::{DirectoryApi, DirectoryClient};
use crate::services::error::BrokerError;
use crate::services::files_client::{FilesApi, FilesClient};
use crate::services::identity_client::{IdentityProvider, ProviderFailure};
use crate::services::state_store::StateStore;
use crate::services::token_broker::{BrokerTokenProvider, SilentOutcome, TokenBroker};

/// Redirect instruction returned when silent acquisition failed and
/// user consent is required.
#[derive(Debug, Clone, Serialize)]
pub struct RedirectInstruction {
    pub authorization_url: String,
}

/// Completed page data: the caller proceeds to render it.
#[derive(Debug, Clone, Serialize)]
pub struct FilesPage {
    pub user: UserProfile,
    pub files: Vec<FileItem>,
}

/// Terminal outcome of one files request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FlowOutcome {
    Redirect(RedirectInstruction),
    Complete(FilesPage),
}

/// Static knobs the controller needs per request chain.
#[derive(Clone)]
pub struct FlowSettings {
    pub discovery_resource: String,
    pub directory_resource: String,
    pub files_capability: String,
    pub redirect_uri: String,
    pub request_timeout: StdDuration,
}

impl FlowSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            discovery_resource: settings.discovery.resource.clone(),
            directory_resource: settings.directory.resource.clone(),
            files_capability: settings.broker.files_capability.clone(),
            redirect_uri: format!(
                "{}{}",
                settings.server.public_url.trim_end_matches('/'),
                settings.identity.redirect_path
            ),
            request_timeout: StdDuration::from_secs(settings.broker.request_timeout_seconds),
        }
    }
}

/// Drives the per-request token chain: discovery token, directory
/// profile, capability resolution, capability token, file listing.
///
/// Any step that needs user interaction collapses into one redirect
/// bound to the ORIGINAL origin URL, so the user lands back where they
/// started after re-consenting. Fatal errors propagate; they are never
/// flattened into an empty listing.
pub struct RedirectFlowController {
    broker: Arc<TokenBroker>,
    states: Arc<dyn StateStore>,
    resolver: Arc<CapabilityResolver>,
    identity: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryApi>,
    files: Arc<dyn FilesApi>,
    settings: FlowSettings,
}

impl RedirectFlowController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: Arc<TokenBroker>,
        states: Arc<dyn StateStore>,
        resolver: Arc<CapabilityResolver>,
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn DirectoryApi>,
        files: Arc<dyn FilesApi>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            broker,
            states,
            resolver,
            identity,
            directory,
            files,
            settings,
        }
    }

    /// Run the full chain for one request, bounded by the request timeout.
    ///
    /// `inbound_auth_error` is the provider-reported error forwarded by
    /// the caller (e.g. a failed prior consent); when present the chain
    /// short-circuits straight to a fresh interactive redirect.
    pub async fn run(
        &self,
        user_id: &str,
        origin_url: &str,
        inbound_auth_error: Option<&str>,
    ) -> Result<FlowOutcome, BrokerError> {
        tokio::time::timeout(
            self.settings.request_timeout,
            self.run_chain(user_id, origin_url, inbound_auth_error),
        )
        .await
        .map_err(|_| BrokerError::Transient {
            service: "resource-chain",
            message: format!(
                "resource chain exceeded {}s",
                self.settings.request_timeout.as_secs()
            ),
        })?
    }

    async fn run_chain(
        &self,
        user_id: &str,
        origin_url: &str,
        inbound_auth_error: Option<&str>,
    ) -> Result<FlowOutcome, BrokerError> {
        if let Some(err) = inbound_auth_error {
            tracing::warn!(user_id, error = err, "inbound authorization error, re-consenting");
            return self.interactive_redirect(user_id, origin_url).await;
        }

        let discovery_token = match self
            .broker
            .acquire_silent(user_id, &self.settings.discovery_resource)
            .await?
        {
            SilentOutcome::Token(record) => record,
            SilentOutcome::NeedsInteractive => {
                return self.interactive_redirect(user_id, origin_url).await;
            }
        };

        tracing::debug!(user_id, "discovery token secured, resource chain in progress");

        let provider = Arc::new(BrokerTokenProvider::new(self.broker.clone(), user_id));

        let directory = DirectoryClient::new(
            self.directory.clone(),
            provider.clone(),
            self.settings.directory_resource.clone(),
        );
        let profile = match directory.lookup_user(user_id).await {
            Ok(profile) => profile,
            Err(BrokerError::InteractionRequired) => {
                return self.interactive_redirect(user_id, origin_url).await;
            }
            Err(e) => return Err(e),
        };

        let binding = self
            .resolver
            .resolve(&self.settings.files_capability, &discovery_token.access_token)
            .await?;

        let files_client = FilesClient::new(self.files.clone(), provider, binding);
        let files = match files_client.list_items().await {
            Ok(files) => files,
            Err(BrokerError::InteractionRequired) => {
                // Later-step consent loss still sends the user back to
                // the original origin, not the intermediate resource.
                return self.interactive_redirect(user_id, origin_url).await;
            }
            Err(e) => return Err(e),
        };

        tracing::info!(user_id, files = files.len(), "resource chain complete");

        Ok(FlowOutcome::Complete(FilesPage {
            user: profile,
            files,
        }))
    }

    async fn interactive_redirect(
        &self,
        user_id: &str,
        origin_url: &str,
    ) -> Result<FlowOutcome, BrokerError> {
        let state_id = self.states.create(user_id, origin_url).await?;
        let authorization_url = self.identity.authorization_url(
            &self.settings.discovery_resource,
            &self.settings.redirect_uri,
            &state_id,
        );

        tracing::info!(user_id, "issuing interactive authorization redirect");

        Ok(FlowOutcome::Redirect(RedirectInstruction {
            authorization_url,
        }))
    }

    /// Callback path: validate (and thereby consume) the state, redeem
    /// the authorization code for the discovery resource, seed the
    /// cache, and hand back the origin URL the user agent should be
    /// sent to. An invalid state is an authentication failure; the
    /// bound origin URL is never revealed for it.
    pub async fn complete_interactive(
        &self,
        state_id: &str,
        code: &str,
    ) -> Result<String, BrokerError> {
        let Some((user_id, origin_url)) = self.states.validate(state_id).await? else {
            return Err(BrokerError::InvalidState);
        };

        let issued = self
            .identity
            .redeem_code(
                &self.settings.discovery_resource,
                code,
                &self.settings.redirect_uri,
            )
            .await
            .map_err(|e| match e {
                ProviderFailure::Transient(message) => BrokerError::Transient {
                    service: "identity-provider",
                    message,
                },
                ProviderFailure::InteractionRequired(reason)
                | ProviderFailure::Configuration(reason) => {
                    // A code that cannot be redeemed silently is a dead
                    // authorization round-trip, not a retry candidate.
                    BrokerError::Configuration(format!("code redemption failed: {}", reason))
                }
            })?;

        self.broker
            .store_issued(&user_id, &self.settings.discovery_resource, issued)
            .await?;

        tracing::info!(user_id, "interactive authorization completed");

        Ok(origin_url)
    }
}
