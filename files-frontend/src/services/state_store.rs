use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::models::StateEntry;
use crate::services::error::BrokerError;

/// Durable store of single-use CSRF state tokens.
///
/// `validate` consumes: the lookup and the spent-flag write happen as
/// one conditional update, so two concurrent validations of the same
/// identifier cannot both succeed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Mint and persist a fresh state for a pending redirect.
    async fn create(&self, user_id: &str, origin_url: &str) -> Result<String, BrokerError>;

    /// Consume-on-validate. `None` when the identifier is unknown,
    /// expired, or already spent.
    async fn validate(&self, state_id: &str) -> Result<Option<(String, String)>, BrokerError>;

    /// Drop entries past the TTL, consumed or not. Returns rows removed.
    async fn prune_expired(&self) -> Result<u64, BrokerError>;
}

pub struct PostgresStateStore {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn create(&self, user_id: &str, origin_url: &str) -> Result<String, BrokerError> {
        let entry = StateEntry::new(user_id, origin_url);

        sqlx::query(
            "INSERT INTO auth_states (state_id, user_id, origin_url, created_utc) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&entry.state_id)
        .bind(&entry.user_id)
        .bind(&entry.origin_url)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id, "issued authorization state");
        Ok(entry.state_id)
    }

    async fn validate(&self, state_id: &str) -> Result<Option<(String, String)>, BrokerError> {
        let cutoff = Utc::now() - self.ttl;

        // Conditional update is the consume step: only an unspent,
        // unexpired row matches, and the guard makes double validation
        // lose the race deterministically.
        let row = sqlx::query_as::<_, (String, String)>(
            r#"
            UPDATE auth_states SET consumed_utc = now()
            WHERE state_id = $1 AND consumed_utc IS NULL AND created_utc > $2
            RETURNING user_id, origin_url
            "#,
        )
        .bind(state_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            tracing::warn!("authorization state rejected: unknown, expired, or already consumed");
        }

        Ok(row)
    }

    async fn prune_expired(&self) -> Result<u64, BrokerError> {
        let cutoff = Utc::now() - self.ttl;

        let result = sqlx::query("DELETE FROM auth_states WHERE created_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory store used by tests; one mutex guards lookup-and-consume
/// so the single-use property holds under concurrency here too.
pub struct MockStateStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, StateEntry>>,
    ttl: Duration,
}

impl MockStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
            ttl,
        }
    }

    /// Insert a pre-built entry, letting tests back-date creation.
    pub fn insert_raw(&self, entry: StateEntry) {
        self.entries
            .lock()
            .expect("mock state mutex poisoned")
            .insert(entry.state_id.clone(), entry);
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn create(&self, user_id: &str, origin_url: &str) -> Result<String, BrokerError> {
        let entry = StateEntry::new(user_id, origin_url);
        let state_id = entry.state_id.clone();
        self.entries
            .lock()
            .map_err(|_| BrokerError::Configuration("mock state mutex poisoned".to_string()))?
            .insert(state_id.clone(), entry);
        Ok(state_id)
    }

    async fn validate(&self, state_id: &str) -> Result<Option<(String, String)>, BrokerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BrokerError::Configuration("mock state mutex poisoned".to_string()))?;

        let Some(entry) = entries.get_mut(state_id) else {
            return Ok(None);
        };
        if entry.is_spent() || entry.is_expired(self.ttl) {
            return Ok(None);
        }

        entry.consumed_utc = Some(Utc::now());
        Ok(Some((entry.user_id.clone(), entry.origin_url.clone())))
    }

    async fn prune_expired(&self) -> Result<u64, BrokerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BrokerError::Configuration("mock state mutex poisoned".to_string()))?;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| !e.is_expired(ttl));
        Ok((before - entries.len()) as u64)
    }
}
