use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::TokenRecord;
use crate::services::error::BrokerError;

/// Durable, per-user store of issued tokens keyed by (user, resource).
///
/// Implementations must make `store` atomic: concurrent refreshes for
/// the same pair may race, but the stored row is always one complete
/// record, never a mix of two.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn lookup(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<TokenRecord>, BrokerError>;

    /// Insert or replace the record for (user, resource) in one statement.
    async fn store(&self, record: &TokenRecord) -> Result<(), BrokerError>;
}

#[derive(Clone)]
pub struct PostgresTokenCache {
    pool: PgPool,
}

impl PostgresTokenCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenCache for PostgresTokenCache {
    async fn lookup(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<TokenRecord>, BrokerError> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT user_id, resource, access_token, refresh_token, expires_at \
             FROM token_cache WHERE user_id = $1 AND resource = $2",
        )
        .bind(user_id)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn store(&self, record: &TokenRecord) -> Result<(), BrokerError> {
        // Single-statement upsert keeps the read-modify-write atomic under
        // concurrent refreshes of the same (user, resource).
        sqlx::query(
            r#"
            INSERT INTO token_cache (user_id, resource, access_token, refresh_token, expires_at, updated_utc)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (user_id, resource) DO UPDATE
            SET access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                updated_utc = now()
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.resource)
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory cache used by tests; mutations go through one mutex so it
/// keeps the same atomic-replacement contract as the Postgres impl.
#[derive(Default)]
pub struct MockTokenCache {
    records: std::sync::Mutex<std::collections::HashMap<(String, String), TokenRecord>>,
}

impl MockTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for MockTokenCache {
    async fn lookup(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<TokenRecord>, BrokerError> {
        let records = self
            .records
            .lock()
            .map_err(|_| BrokerError::Configuration("mock cache mutex poisoned".to_string()))?;
        Ok(records
            .get(&(user_id.to_string(), resource.to_string()))
            .cloned())
    }

    async fn store(&self, record: &TokenRecord) -> Result<(), BrokerError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| BrokerError::Configuration("mock cache mutex poisoned".to_string()))?;
        records.insert(
            (record.user_id.clone(), record.resource.clone()),
            record.clone(),
        );
        Ok(())
    }
}
