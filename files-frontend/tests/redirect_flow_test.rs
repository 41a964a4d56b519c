use chrono::Duration;
use files_frontend::config::BrokerSettings;
use files_frontend::models::{CapabilityBinding, FileItem, TokenRecord, UserProfile};
use files_frontend::services::capability_resolver::{CapabilityResolver, MockDiscovery};
use files_frontend::services::directory_client::MockDirectory;
use files_frontend::services::error::BrokerError;
use files_frontend::services::files_client::MockFilesApi;
use files_frontend::services::flow::{FlowOutcome, FlowSettings, RedirectFlowController};
use files_frontend::services::identity_client::{IssuedToken, MockIdentityProvider};
use files_frontend::services::state_store::{MockStateStore, StateStore};
use files_frontend::services::token_broker::TokenBroker;
use files_frontend::services::token_cache::{MockTokenCache, TokenCache};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const DISCOVERY_RESOURCE: &str = "https://discovery.test/";
const DIRECTORY_RESOURCE: &str = "https://directory.test/";
const FILES_RESOURCE: &str = "https://files.test/";
const ORIGIN: &str = "http://localhost:8080/files";

struct Harness {
    cache: Arc<MockTokenCache>,
    provider: Arc<MockIdentityProvider>,
    states: Arc<MockStateStore>,
    discovery: Arc<MockDiscovery>,
    files: Arc<MockFilesApi>,
    flow: RedirectFlowController,
}

fn harness(discovery: MockDiscovery, directory: MockDirectory, files: MockFilesApi) -> Harness {
    let settings = BrokerSettings {
        clock_skew_seconds: 300,
        state_ttl_seconds: 600,
        binding_ttl_seconds: 86_400,
        max_retries: 0,
        retry_backoff_ms: 1,
        request_timeout_seconds: 5,
        files_capability: "files".to_string(),
    };

    let cache = Arc::new(MockTokenCache::new());
    let provider = Arc::new(MockIdentityProvider::new());
    let states = Arc::new(MockStateStore::new(Duration::minutes(10)));
    let discovery = Arc::new(discovery);
    let files = Arc::new(files);

    let broker = Arc::new(TokenBroker::new(cache.clone(), provider.clone(), &settings));
    let resolver = Arc::new(CapabilityResolver::new(
        discovery.clone(),
        Duration::hours(24),
    ));

    let flow = RedirectFlowController::new(
        broker,
        states.clone(),
        resolver,
        provider.clone(),
        Arc::new(directory),
        files.clone(),
        FlowSettings {
            discovery_resource: DISCOVERY_RESOURCE.to_string(),
            directory_resource: DIRECTORY_RESOURCE.to_string(),
            files_capability: "files".to_string(),
            redirect_uri: "http://localhost:8080/oauth/callback".to_string(),
            request_timeout: StdDuration::from_secs(5),
        },
    );

    Harness {
        cache,
        provider,
        states,
        discovery,
        files,
        flow,
    }
}

fn binding() -> CapabilityBinding {
    CapabilityBinding::new("files", FILES_RESOURCE, "https://files.test/v1")
}

fn profile() -> UserProfile {
    UserProfile {
        display_name: "Pat Example".to_string(),
        mail: Some("pat@example.test".to_string()),
    }
}

fn file(name: &str) -> FileItem {
    FileItem {
        name: name.to_string(),
        size: Some(42),
        last_modified: None,
    }
}

async fn seed_token(h: &Harness, resource: &str) {
    h.cache
        .store(&TokenRecord::new("user_1", resource, "tok", None, 3600))
        .await
        .unwrap();
}

fn state_from_url(authorization_url: &str) -> &str {
    authorization_url
        .split("state=")
        .nth(1)
        .expect("authorization URL carries a state parameter")
}

#[tokio::test]
async fn test_no_cached_token_yields_redirect_with_fresh_state() {
    let h = harness(MockDiscovery::new(), MockDirectory::new(), MockFilesApi::new());

    let outcome = h.flow.run("user_1", ORIGIN, None).await.unwrap();
    let FlowOutcome::Redirect(redirect) = outcome else {
        panic!("expected redirect for a first-time user");
    };

    // The state rides the URL and is bound to the user and origin.
    let state_id = state_from_url(&redirect.authorization_url);
    let validated = h.states.validate(state_id).await.unwrap();
    assert_eq!(
        validated,
        Some(("user_1".to_string(), ORIGIN.to_string()))
    );
}

#[tokio::test]
async fn test_fully_cached_chain_completes_with_no_network() {
    let h = harness(
        MockDiscovery::new().with_capability(binding()),
        MockDirectory::new().with_user("user_1", profile()),
        MockFilesApi::new().with_items(vec![file("report.pdf"), file("notes.txt")]),
    );

    seed_token(&h, DISCOVERY_RESOURCE).await;
    seed_token(&h, DIRECTORY_RESOURCE).await;
    seed_token(&h, FILES_RESOURCE).await;

    let outcome = h.flow.run("user_1", ORIGIN, None).await.unwrap();
    let FlowOutcome::Complete(page) = outcome else {
        panic!("expected completed page");
    };
    assert_eq!(page.user.display_name, "Pat Example");
    assert_eq!(page.files.len(), 2);

    assert_eq!(h.provider.call_count(), 0);
    assert_eq!(h.discovery.call_count(), 1);

    // Second request reuses the cached binding as well.
    let outcome = h.flow.run("user_1", ORIGIN, None).await.unwrap();
    assert!(matches!(outcome, FlowOutcome::Complete(_)));
    assert_eq!(h.discovery.call_count(), 1);
}

#[tokio::test]
async fn test_late_step_consent_loss_redirects_to_original_origin() {
    let h = harness(
        MockDiscovery::new().with_capability(binding()),
        MockDirectory::new().with_user("user_1", profile()),
        MockFilesApi::new().with_items(vec![file("report.pdf")]),
    );

    // Discovery and directory tokens cached; the files-resource token is
    // missing and the provider has nothing scripted, so the last hop
    // needs interaction.
    seed_token(&h, DISCOVERY_RESOURCE).await;
    seed_token(&h, DIRECTORY_RESOURCE).await;

    let origin = "http://localhost:8080/files?folder=reports";
    let outcome = h.flow.run("user_1", origin, None).await.unwrap();
    let FlowOutcome::Redirect(redirect) = outcome else {
        panic!("expected redirect when the capability token needs consent");
    };

    // Redirect binds the ORIGINAL origin, not the capability endpoint.
    let state_id = state_from_url(&redirect.authorization_url);
    let validated = h.states.validate(state_id).await.unwrap();
    assert_eq!(validated, Some(("user_1".to_string(), origin.to_string())));
    assert_eq!(h.files.call_count(), 0);
}

#[tokio::test]
async fn test_inbound_auth_error_short_circuits_to_redirect() {
    let h = harness(MockDiscovery::new(), MockDirectory::new(), MockFilesApi::new());

    seed_token(&h, DISCOVERY_RESOURCE).await;

    let outcome = h
        .flow
        .run("user_1", ORIGIN, Some("access_denied"))
        .await
        .unwrap();
    assert!(matches!(outcome, FlowOutcome::Redirect(_)));

    // No silent acquisition was attempted for the forwarded error.
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_fatal_failure_propagates_instead_of_empty_listing() {
    let h = harness(
        MockDiscovery::new().with_capability(binding()),
        MockDirectory::new().with_user("user_1", profile()),
        MockFilesApi::new().failing(),
    );

    seed_token(&h, DISCOVERY_RESOURCE).await;
    seed_token(&h, DIRECTORY_RESOURCE).await;
    seed_token(&h, FILES_RESOURCE).await;

    let err = h.flow.run("user_1", ORIGIN, None).await.unwrap_err();
    assert!(matches!(err, BrokerError::Transient { .. }));
}

#[tokio::test]
async fn test_callback_redeems_code_and_seeds_cache() {
    let h = harness(MockDiscovery::new(), MockDirectory::new(), MockFilesApi::new());

    let state_id = h.states.create("user_1", ORIGIN).await.unwrap();
    h.provider.grant_code(
        "code_abc",
        IssuedToken {
            access_token: "redeemed_tok".to_string(),
            refresh_token: Some("refresh_new".to_string()),
            expires_in: 3600,
        },
    );

    let origin = h
        .flow
        .complete_interactive(&state_id, "code_abc")
        .await
        .unwrap();
    assert_eq!(origin, ORIGIN);

    let stored = h
        .cache
        .lookup("user_1", DISCOVERY_RESOURCE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "redeemed_tok");

    // Replay with the spent state must fail without leaking the origin.
    let err = h
        .flow
        .complete_interactive(&state_id, "code_abc")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidState));
}

#[tokio::test]
async fn test_unknown_state_rejected_on_callback() {
    let h = harness(MockDiscovery::new(), MockDirectory::new(), MockFilesApi::new());

    let err = h
        .flow
        .complete_interactive("forged-state", "code_abc")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidState));
}
