use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use service_core::retry::RetryClass;
use thiserror::Error;

use crate::config::IdentitySettings;

/// Token response from the identity provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Why the provider could not produce a token.
#[derive(Debug, Clone, Error)]
pub enum ProviderFailure {
    /// Consent or re-authentication is mandatory; the caller must
    /// initiate an interactive redirect.
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    /// Network or provider-side failure that may succeed on retry.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider rejected the client credentials or resource.
    #[error("provider rejected request: {0}")]
    Configuration(String),
}

impl RetryClass for ProviderFailure {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderFailure::Transient(_))
    }
}

/// Identity-provider token endpoint, consumed as a contract: the broker
/// depends on this trait, not on any particular wire protocol.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain a token for `resource` without user involvement, using the
    /// held refresh token when there is one.
    async fn acquire_silent(
        &self,
        resource: &str,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<IssuedToken, ProviderFailure>;

    /// Redeem an authorization code arriving on the callback endpoint.
    async fn redeem_code(
        &self,
        resource: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IssuedToken, ProviderFailure>;

    /// Authorization-request URL for the interactive consent redirect.
    /// Carries resource, client id, redirect URI, and the opaque state.
    fn authorization_url(&self, resource: &str, redirect_uri: &str, state: &str) -> String;
}

/// Error body the provider returns on a 4xx token response.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    authority: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl HttpIdentityProvider {
    pub fn new(settings: &IdentitySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            authority: settings.authority.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        }
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.authority)
    }

    async fn post_token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<IssuedToken, ProviderFailure> {
        let url = self.token_endpoint();

        let response = self
            .client
            .traced_post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "token endpoint unreachable");
                ProviderFailure::Transient(format!("token endpoint unreachable: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<IssuedToken>().await.map_err(|e| {
                ProviderFailure::Transient(format!("malformed token response: {}", e))
            });
        }

        if status.is_server_error() {
            return Err(ProviderFailure::Transient(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_oauth_error(&body, status.as_u16()))
    }
}

/// Map an OAuth error body onto the broker's failure classes.
///
/// `invalid_grant` covers revoked consent and expired refresh tokens,
/// both of which only interactive re-auth can fix.
fn classify_oauth_error(body: &str, status: u16) -> ProviderFailure {
    let parsed: Option<OAuthErrorBody> = serde_json::from_str(body).ok();

    let Some(err) = parsed else {
        return ProviderFailure::Configuration(format!(
            "token endpoint returned {} with unrecognized body",
            status
        ));
    };

    let description = err.error_description.unwrap_or_default();
    match err.error.as_str() {
        "interaction_required" | "consent_required" | "login_required" | "invalid_grant" => {
            ProviderFailure::InteractionRequired(format!("{}: {}", err.error, description))
        }
        "temporarily_unavailable" => {
            ProviderFailure::Transient(format!("{}: {}", err.error, description))
        }
        _ => ProviderFailure::Configuration(format!("{}: {}", err.error, description)),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn acquire_silent(
        &self,
        resource: &str,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<IssuedToken, ProviderFailure> {
        let Some(refresh) = refresh_token else {
            // Nothing to refresh with; only interactive consent can
            // establish the first grant for this resource.
            return Err(ProviderFailure::InteractionRequired(
                "no refresh token on file".to_string(),
            ));
        };

        tracing::debug!(user_id, resource, "silent token acquisition");

        self.post_token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("resource", resource),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
        ])
        .await
    }

    async fn redeem_code(
        &self,
        resource: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IssuedToken, ProviderFailure> {
        self.post_token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("resource", resource),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
        ])
        .await
    }

    fn authorization_url(&self, resource: &str, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/oauth2/authorize?response_type=code&client_id={}&resource={}&redirect_uri={}&state={}",
            self.authority,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(resource),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        )
    }
}

/// Scripted identity provider for tests, with a call counter so the
/// network-free cache-hit property is assertable.
#[derive(Default)]
pub struct MockIdentityProvider {
    responses: std::sync::Mutex<
        std::collections::HashMap<String, std::collections::VecDeque<Result<IssuedToken, ProviderFailure>>>,
    >,
    code_grants: std::sync::Mutex<std::collections::HashMap<String, IssuedToken>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next silent-acquisition outcome for `resource`.
    pub fn script(&self, resource: &str, outcome: Result<IssuedToken, ProviderFailure>) {
        self.responses
            .lock()
            .expect("mock provider mutex poisoned")
            .entry(resource.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Register an authorization code the mock will redeem.
    pub fn grant_code(&self, code: &str, token: IssuedToken) {
        self.code_grants
            .lock()
            .expect("mock provider mutex poisoned")
            .insert(code.to_string(), token);
    }

    /// Total silent-acquisition calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn acquire_silent(
        &self,
        resource: &str,
        _user_id: &str,
        _refresh_token: Option<&str>,
    ) -> Result<IssuedToken, ProviderFailure> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut responses = self.responses.lock().expect("mock provider mutex poisoned");
        responses
            .get_mut(resource)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(ProviderFailure::InteractionRequired(
                    "no scripted response".to_string(),
                ))
            })
    }

    async fn redeem_code(
        &self,
        _resource: &str,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<IssuedToken, ProviderFailure> {
        self.code_grants
            .lock()
            .expect("mock provider mutex poisoned")
            .get(code)
            .cloned()
            .ok_or_else(|| ProviderFailure::Configuration("unknown authorization code".to_string()))
    }

    fn authorization_url(&self, resource: &str, redirect_uri: &str, state: &str) -> String {
        format!(
            "https://login.test/oauth2/authorize?response_type=code&client_id=test-client&resource={}&redirect_uri={}&state={}",
            urlencoding::encode(resource),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_interaction_required() {
        let body = r#"{"error":"invalid_grant","error_description":"refresh token expired"}"#;
        assert!(matches!(
            classify_oauth_error(body, 400),
            ProviderFailure::InteractionRequired(_)
        ));
    }

    #[test]
    fn test_classify_configuration() {
        let body = r#"{"error":"invalid_client","error_description":"bad secret"}"#;
        assert!(matches!(
            classify_oauth_error(body, 401),
            ProviderFailure::Configuration(_)
        ));
    }

    #[test]
    fn test_classify_transient() {
        let body = r#"{"error":"temporarily_unavailable"}"#;
        assert!(matches!(
            classify_oauth_error(body, 400),
            ProviderFailure::Transient(_)
        ));
    }

    #[test]
    fn test_classify_unrecognized_body() {
        assert!(matches!(
            classify_oauth_error("<html>gateway error</html>", 400),
            ProviderFailure::Configuration(_)
        ));
    }
}
