pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use services::flow::RedirectFlowController;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: config::Settings,
    pub flow: Arc<RedirectFlowController>,
    pub pool: PgPool,
}

impl AppState {
    pub fn new(
        config: config::Settings,
        flow: Arc<RedirectFlowController>,
        pool: PgPool,
    ) -> Self {
        Self { config, flow, pool }
    }
}
