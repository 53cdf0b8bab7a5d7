//! Handle Cache - Database layer for caching handle → key bindings
use crate::{
    error::{AuthzError, AuthzResult},
    identity::{Handle, PublicKey},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

/// Cached handle binding
#[derive(Debug, Clone)]
pub struct CachedHandle {
    pub handle: Handle,
    pub key: PublicKey,
    pub updated_at: DateTime<Utc>,
}

/// Handle cache manager
#[derive(Clone)]
pub struct HandleCache {
    db: SqlitePool,
    /// TTL for handle bindings (default: 5 minutes)
    ttl: Duration,
}

impl HandleCache {
    /// Create a new handle cache
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            ttl: Duration::minutes(5),
        }
    }

    /// Set custom TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get cached binding, dropping it if expired
    pub async fn get(&self, handle: &Handle) -> AuthzResult<Option<CachedHandle>> {
        let result = sqlx::query(
            r#"
            SELECT handle, public_key, updated_at
            FROM handle_cache
            WHERE handle = ?1
            "#,
        )
        .bind(handle.as_str())
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = result {
            let cached = CachedHandle {
                handle: handle.clone(),
                key: PublicKey::parse(&row.try_get::<String, _>("public_key")?)
                    .map_err(|e| AuthzError::Internal(format!("Corrupt cached key: {}", e)))?,
                updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
            };

            if Utc::now() - cached.updated_at < self.ttl {
                return Ok(Some(cached));
            }

            // Cache expired, delete it
            self.delete(handle).await?;
        }

        Ok(None)
    }

    /// Cache handle binding
    pub async fn put(&self, handle: &Handle, key: &PublicKey) -> AuthzResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO handle_cache (handle, public_key, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(handle) DO UPDATE SET
                public_key = excluded.public_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(handle.as_str())
        .bind(key.to_address())
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Delete handle from cache
    async fn delete(&self, handle: &Handle) -> AuthzResult<()> {
        sqlx::query("DELETE FROM handle_cache WHERE handle = ?1")
            .bind(handle.as_str())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Clean up expired cache entries, returning how many were removed
    pub async fn cleanup_expired(&self) -> AuthzResult<u64> {
        let cutoff = (Utc::now() - self.ttl).to_rfc3339();

        let result = sqlx::query("DELETE FROM handle_cache WHERE updated_at < ?1")
            .bind(&cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Parse RFC3339 timestamp
fn parse_timestamp(s: &str) -> AuthzResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuthzError::Internal(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::keys::test_keys::key;

    async fn create_test_cache() -> HandleCache {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        HandleCache::new(pool)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = create_test_cache().await;
        let handle = Handle::parse("alice").unwrap();

        cache.put(&handle, &key(1)).await.unwrap();

        let cached = cache.get(&handle).await.unwrap().unwrap();
        assert_eq!(cached.key, key(1));

        // Lookups normalize case through Handle
        let upper = Handle::parse("ALICE").unwrap();
        assert!(cache.get(&upper).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = create_test_cache().await.with_ttl(Duration::zero());
        let handle = Handle::parse("carol").unwrap();

        cache.put(&handle, &key(3)).await.unwrap();
        assert!(cache.get(&handle).await.unwrap().is_none());
        assert_eq!(cache.cleanup_expired().await.unwrap(), 0);
    }
}
