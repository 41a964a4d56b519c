use axum::{
    extract::{Query, State},
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Instant;
use tower_sessions::Session;

use crate::services::flow::FlowOutcome;
use crate::services::metrics::observe_chain_duration;
use crate::AppState;

#[derive(Deserialize)]
pub struct FilesQuery {
    /// Authorization error forwarded from a failed prior consent.
    pub error: Option<String>,
}

/// Files page: runs the full token chain for the signed-in user and
/// either returns the listing or redirects the agent to the identity
/// provider's consent page.
pub async fn files_page(
    State(state): State<AppState>,
    session: Session,
    uri: Uri,
    Query(query): Query<FilesQuery>,
) -> Result<Response, AppError> {
    let user_id: String = session
        .get("user_id")
        .await
        .ok()
        .flatten()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("no signed-in user")))?;

    // The origin the user returns to after consent is this exact
    // request, query string included, minus the forwarded error.
    let mut origin_url = format!(
        "{}{}",
        state.config.server.public_url.trim_end_matches('/'),
        uri.path()
    );
    if let Some(query_string) = uri.query() {
        let kept: Vec<&str> = query_string
            .split('&')
            .filter(|pair| !pair.starts_with("error=") && !pair.is_empty())
            .collect();
        if !kept.is_empty() {
            origin_url.push('?');
            origin_url.push_str(&kept.join("&"));
        }
    }

    let started = Instant::now();
    let outcome = state
        .flow
        .run(&user_id, &origin_url, query.error.as_deref())
        .await
        .map_err(|e| {
            observe_chain_duration("failed", started.elapsed().as_secs_f64());
            tracing::error!(user_id = %user_id, error = %e, "resource chain failed");
            AppError::from(e)
        })?;

    match outcome {
        FlowOutcome::Redirect(instruction) => {
            observe_chain_duration("redirect", started.elapsed().as_secs_f64());
            Ok(Redirect::to(&instruction.authorization_url).into_response())
        }
        FlowOutcome::Complete(page) => {
            observe_chain_duration("complete", started.elapsed().as_secs_f64());
            Ok(Json(page).into_response())
        }
    }
}
