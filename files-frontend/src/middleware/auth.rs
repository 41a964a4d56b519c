use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

/// Sign-in happens upstream of this service; requests without an
/// established user in the session are rejected, never guessed. The
/// user identifier is read here once and carried explicitly through
/// every component call, not from ambient state.
pub async fn auth_middleware(
    session: Session,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id: Option<String> = session.get("user_id").await.unwrap_or(None);

    if user_id.is_none() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
