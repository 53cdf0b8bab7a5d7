//! Handle Directory - resolves handles to identity keys with caching
use crate::{
    error::{AuthzError, AuthzResult},
    identity::{Handle, HandleCache, PublicKey},
    metrics,
    rate_limit::LookupLimiter,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Handle lookup collaborator
#[async_trait]
pub trait HandleLookup: Send + Sync {
    /// Key registered for `handle`, or `None` when the handle is unregistered
    async fn lookup_by_handle(&self, handle: &Handle) -> AuthzResult<Option<PublicKey>>;
}

/// Handle directory configuration
#[derive(Debug, Clone)]
pub struct HandleDirectoryConfig {
    /// Base URL of the name service; cache-only when absent
    pub base_url: Option<String>,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HandleDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: format!("contact-trust/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
        }
    }
}

/// Name service response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleRecord {
    public_key: String,
}

/// Main handle directory - combines caching with HTTP resolution
#[derive(Clone)]
pub struct HandleDirectory {
    cache: HandleCache,
    http_client: reqwest::Client,
    limiter: LookupLimiter,
    config: HandleDirectoryConfig,
}

impl HandleDirectory {
    /// Create a new handle directory
    pub fn new(
        cache: HandleCache,
        limiter: LookupLimiter,
        config: HandleDirectoryConfig,
    ) -> AuthzResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AuthzError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            cache,
            http_client,
            limiter,
            config,
        })
    }

    /// URL of the record for `handle`
    fn record_url(base_url: &str, handle: &Handle) -> String {
        format!(
            "{}/handles/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(handle.as_str())
        )
    }

    /// Fetch the binding from the name service
    async fn fetch(&self, base_url: &str, handle: &Handle) -> AuthzResult<Option<PublicKey>> {
        self.limiter.check()?;

        let url = Self::record_url(base_url, handle);
        debug!("Fetching handle record {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthzError::Lookup(format!("Failed to fetch handle record: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(AuthzError::Lookup(format!(
                "Name service returned error: {}",
                response.status()
            )));
        }

        let record: HandleRecord = response
            .json()
            .await
            .map_err(|e| AuthzError::Lookup(format!("Invalid handle record: {}", e)))?;

        let key = PublicKey::parse(&record.public_key)
            .map_err(|e| AuthzError::Lookup(format!("Handle record carries bad key: {}", e)))?;

        Ok(Some(key))
    }

    /// Clean up expired cache entries
    pub async fn cleanup_cache(&self) -> AuthzResult<u64> {
        self.cache.cleanup_expired().await
    }
}

#[async_trait]
impl HandleLookup for HandleDirectory {
    /// Resolution order:
    /// 1. Check cache first (fast path)
    /// 2. Ask the name service, if configured
    /// 3. Cache successful resolution
    async fn lookup_by_handle(&self, handle: &Handle) -> AuthzResult<Option<PublicKey>> {
        if let Some(cached) = self.cache.get(handle).await? {
            metrics::HANDLE_LOOKUPS_TOTAL
                .with_label_values(&["cache"])
                .inc();
            return Ok(Some(cached.key));
        }

        let Some(base_url) = self.config.base_url.as_deref() else {
            metrics::HANDLE_LOOKUPS_TOTAL
                .with_label_values(&["unconfigured"])
                .inc();
            return Ok(None);
        };

        match self.fetch(base_url, handle).await {
            Ok(Some(key)) => {
                metrics::HANDLE_LOOKUPS_TOTAL
                    .with_label_values(&["found"])
                    .inc();
                self.cache.put(handle, &key).await?;
                Ok(Some(key))
            }
            Ok(None) => {
                metrics::HANDLE_LOOKUPS_TOTAL
                    .with_label_values(&["missing"])
                    .inc();
                Ok(None)
            }
            Err(e) => {
                metrics::HANDLE_LOOKUPS_TOTAL
                    .with_label_values(&["error"])
                    .inc();
                warn!("Handle lookup for {} failed: {}", handle, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::keys::test_keys::key;
    use crate::rate_limit::RateLimitConfig;

    async fn create_test_directory() -> HandleDirectory {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        HandleDirectory::new(
            HandleCache::new(pool),
            LookupLimiter::new(RateLimitConfig::default()),
            HandleDirectoryConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_uses_cache() {
        let directory = create_test_directory().await;
        let handle = Handle::parse("alice").unwrap();

        directory.cache.put(&handle, &key(1)).await.unwrap();

        let resolved = directory.lookup_by_handle(&handle).await.unwrap();
        assert_eq!(resolved, Some(key(1)));
    }

    #[tokio::test]
    async fn test_unconfigured_directory_misses() {
        let directory = create_test_directory().await;
        let handle = Handle::parse("nobody").unwrap();

        assert_eq!(directory.lookup_by_handle(&handle).await.unwrap(), None);
    }

    #[test]
    fn test_record_url() {
        let handle = Handle::parse("dave.smith").unwrap();
        assert_eq!(
            HandleDirectory::record_url("http://names.local/", &handle),
            "http://names.local/handles/dave.smith"
        );
    }
}
