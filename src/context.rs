//! Application context and dependency injection
use crate::{
    agent::{AgentHandle, AgentOptions, AuthorizationAgent},
    authorization::AuthorizationMessage,
    config::AgentConfig,
    contacts::SqliteContactStore,
    db,
    error::{AuthzError, AuthzResult},
    identity::{HandleCache, HandleDirectory, HandleDirectoryConfig},
    rate_limit::{LookupLimiter, RateLimitConfig},
};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AgentConfig>,
    pub db: SqlitePool,
    pub contacts: Arc<SqliteContactStore>,
    pub directory: Arc<HandleDirectory>,
    pub agent: AgentHandle,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AgentConfig) -> AuthzResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        let db = db::create_pool(&config.storage.contacts_db, db::DatabaseOptions::default())
            .await?;

        Self::with_pool(config, db).await
    }

    /// Build the context on an existing pool (migrations are applied here)
    pub async fn with_pool(config: AgentConfig, db: SqlitePool) -> AuthzResult<Self> {
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let contacts = Arc::new(SqliteContactStore::new(db.clone()));

        let cache = HandleCache::new(db.clone()).with_ttl(chrono::Duration::seconds(
            config.identity.handle_cache_ttl_secs as i64,
        ));
        let limiter = LookupLimiter::new(RateLimitConfig {
            lookups_per_second: config.rate_limit.lookups_per_second,
            burst_size: config.rate_limit.burst_size,
        });
        let directory_config = HandleDirectoryConfig {
            base_url: config.identity.directory_url.clone(),
            timeout_secs: config.identity.lookup_timeout_secs,
            ..HandleDirectoryConfig::default()
        };
        let directory = Arc::new(HandleDirectory::new(cache, limiter, directory_config)?);

        match &config.identity.directory_url {
            Some(url) => info!("Resolving handles through {}", url),
            None => info!("No handle directory configured - handles resolve from cache only"),
        }

        let options = AgentOptions {
            debounce: Duration::from_millis(config.identity.lookup_debounce_ms),
            command_buffer: config.authorization.command_buffer,
            event_buffer: config.authorization.event_buffer,
            default_privacy: config.authorization.default_privacy,
            own_extended_key: config.extended_key()?,
        };

        let (mut agent, handle) =
            AuthorizationAgent::new(contacts.clone(), directory.clone(), options);

        if let Some(path) = &config.storage.pending_requests_file {
            let stored = load_pending_requests(path).await?;
            agent.restore(&stored).await?;
        }

        tokio::spawn(agent.run());

        Ok(Self {
            config: Arc::new(config),
            db,
            contacts,
            directory,
            agent: handle,
            started_at: Instant::now(),
        })
    }
}

/// Stored messages, or none when the file does not exist yet
async fn load_pending_requests(path: &Path) -> AuthzResult<Vec<AuthorizationMessage>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(Vec::new());
    }

    let raw = tokio::fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|e| {
        AuthzError::Config(format!(
            "Invalid pending requests file {}: {}",
            path.display(),
            e
        ))
    })
}
