use chrono::Duration;
use dotenvy::dotenv;
use files_frontend::config::get_configuration;
use files_frontend::services::capability_resolver::{CapabilityResolver, HttpDiscoveryClient};
use files_frontend::services::directory_client::HttpDirectoryClient;
use files_frontend::services::files_client::HttpFilesClient;
use files_frontend::services::flow::{FlowSettings, RedirectFlowController};
use files_frontend::services::identity_client::HttpIdentityProvider;
use files_frontend::services::state_store::{PostgresStateStore, StateStore};
use files_frontend::services::token_broker::TokenBroker;
use files_frontend::services::token_cache::PostgresTokenCache;
use files_frontend::startup::build_router;
use files_frontend::AppState;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "files-frontend",
        &configuration.server.log_level,
        configuration.server.otlp_endpoint.as_deref(),
    );

    files_frontend::services::metrics::init_metrics();

    let pool = files_frontend::db::create_pool(&configuration.database).await?;
    files_frontend::db::run_migrations(&pool).await?;

    let identity = Arc::new(HttpIdentityProvider::new(&configuration.identity));
    let cache = Arc::new(PostgresTokenCache::new(pool.clone()));
    let broker = Arc::new(TokenBroker::new(
        cache,
        identity.clone(),
        &configuration.broker,
    ));
    let states = Arc::new(PostgresStateStore::new(
        pool.clone(),
        Duration::seconds(configuration.broker.state_ttl_seconds),
    ));
    // Periodic sweep of expired and spent authorization states.
    {
        let states = states.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                ticker.tick().await;
                match states.prune_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "pruned authorization states"),
                    Err(e) => tracing::warn!(error = %e, "state pruning failed"),
                }
            }
        });
    }

    let resolver = Arc::new(CapabilityResolver::new(
        Arc::new(HttpDiscoveryClient::new(&configuration.discovery)),
        Duration::seconds(configuration.broker.binding_ttl_seconds),
    ));
    let directory = Arc::new(HttpDirectoryClient::new(&configuration.directory));
    let files = Arc::new(HttpFilesClient::new());

    let flow = Arc::new(RedirectFlowController::new(
        broker,
        states,
        resolver,
        identity,
        directory,
        files,
        FlowSettings::from_settings(&configuration),
    ));

    let app = build_router(AppState::new(configuration.clone(), flow, pool));

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting files-frontend on {}", address);
    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
