use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One outstanding CSRF protection token for a pending redirect.
///
/// The state identifier is the only session correlation trusted across
/// the authorization round-trip, so it must be unguessable and usable
/// at most once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StateEntry {
    pub state_id: String,
    pub user_id: String,
    /// URL the user is returned to after consent.
    pub origin_url: String,
    pub created_utc: DateTime<Utc>,
    /// Set when the entry is consumed; spent entries always fail validation.
    pub consumed_utc: Option<DateTime<Utc>>,
}

impl StateEntry {
    pub fn new(user_id: impl Into<String>, origin_url: impl Into<String>) -> Self {
        Self {
            state_id: generate_state_id(),
            user_id: user_id.into(),
            origin_url: origin_url.into(),
            created_utc: Utc::now(),
            consumed_utc: None,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_utc > ttl
    }

    pub fn is_spent(&self) -> bool {
        self.consumed_utc.is_some()
    }
}

/// 256 bits of CSPRNG entropy, URL-safe so it can ride in a query string.
pub fn generate_state_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_id_entropy() {
        let a = generate_state_id();
        let b = generate_state_id();
        assert_ne!(a, b);
        // 32 bytes base64url without padding
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_fresh_entry() {
        let entry = StateEntry::new("user_1", "http://localhost/files");
        assert!(!entry.is_expired(Duration::minutes(10)));
        assert!(!entry.is_spent());
    }

    #[test]
    fn test_expired_entry() {
        let mut entry = StateEntry::new("user_1", "http://localhost/files");
        entry.created_utc = Utc::now() - Duration::minutes(11);
        assert!(entry.is_expired(Duration::minutes(10)));
    }

    #[test]
    fn test_spent_entry() {
        let mut entry = StateEntry::new("user_1", "http://localhost/files");
        entry.consumed_utc = Some(Utc::now());
        assert!(entry.is_spent());
    }
}
