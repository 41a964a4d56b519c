use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One cached access/refresh token pair for a (user, resource) pair.
///
/// At most one live record exists per pair; a successful silent refresh
/// replaces the record whole, never field by field.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TokenRecord {
    /// Stable subject identifier from the identity provider.
    pub user_id: String,

    /// Resource identifier (audience) this token is scoped to.
    pub resource: String,

    /// Opaque access token. Secret; never logged.
    pub access_token: String,

    /// Refresh/continuation token, absent for some grants.
    pub refresh_token: Option<String>,

    /// Absolute expiry of the access token, UTC.
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Build a record from a freshly issued token with a relative lifetime.
    pub fn new(
        user_id: impl Into<String>,
        resource: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_seconds: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource: resource.into(),
            access_token: access_token.into(),
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
        }
    }

    /// Whether the token is still usable once the skew margin is applied.
    pub fn is_fresh(&self, skew: Duration) -> bool {
        Utc::now() + skew < self.expires_at
    }
}
