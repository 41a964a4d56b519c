use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Error reported by the identity provider instead of a code.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Provider callback. The state is validated (and consumed) BEFORE
/// anything else in the callback is trusted; an invalid state is an
/// authentication failure and the bound origin URL is never revealed.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    if let Some(err) = query.error {
        tracing::warn!(
            error = %err,
            description = query.error_description.as_deref().unwrap_or(""),
            "identity provider returned an authorization error"
        );
        return Err(AppError::AuthError(anyhow::anyhow!(
            "authorization was not granted"
        )));
    }

    let (code, state_id) = match (query.code, query.state) {
        (Some(code), Some(state_id)) => (code, state_id),
        _ => {
            return Err(AppError::AuthError(anyhow::anyhow!(
                "callback missing code or state"
            )));
        }
    };

    let origin_url = state.flow.complete_interactive(&state_id, &code).await?;

    Ok(Redirect::to(&origin_url).into_response())
}
