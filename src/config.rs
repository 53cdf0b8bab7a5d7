//! Configuration management for the contact trust agent
use crate::{
    contacts::PrivacySetting,
    error::{AuthzError, AuthzResult},
    identity::ExtendedPublicKey,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub rate_limit: RateLimitConfig,
    pub authorization: AuthorizationConfig,
    pub logging: LoggingConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub contacts_db: PathBuf,
    /// JSON array of stored authorization messages re-admitted at startup
    pub pending_requests_file: Option<PathBuf>,
}

/// Identity resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Name service base URL; handles resolve from cache only when unset
    pub directory_url: Option<String>,
    pub handle_cache_ttl_secs: u64,
    pub handle_cache_cleanup_secs: u64,
    pub lookup_debounce_ms: u64,
    pub lookup_timeout_secs: u64,
}

/// Rate limiting for handle lookups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub lookups_per_second: u32,
    pub burst_size: u32,
}

/// Authorization agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Capacity of the broadcast event channel
    pub event_buffer: usize,
    /// Capacity of the command queue
    pub command_buffer: usize,
    pub default_privacy: PrivacySetting,
    /// Our extended public key, offered in outgoing requests
    pub own_extended_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_directory = PathBuf::from("./data");
        Self {
            service: ServiceConfig {
                host: "127.0.0.1".to_string(),
                port: 4860,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                contacts_db: data_directory.join("contacts.sqlite"),
                data_directory,
                pending_requests_file: None,
            },
            identity: IdentityConfig {
                directory_url: None,
                handle_cache_ttl_secs: 300,
                handle_cache_cleanup_secs: 3600,
                lookup_debounce_ms: 1000,
                lookup_timeout_secs: 10,
            },
            rate_limit: RateLimitConfig {
                lookups_per_second: 5,
                burst_size: 10,
            },
            authorization: AuthorizationConfig {
                event_buffer: 256,
                command_buffer: 64,
                default_privacy: PrivacySetting::Secret,
                own_extended_key: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthzResult<Self> {
        dotenv::dotenv().ok();

        let host = env::var("TRUST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("TRUST_PORT")
            .unwrap_or_else(|_| "4860".to_string())
            .parse()
            .map_err(|_| AuthzError::Config("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();

        let data_directory: PathBuf = env::var("TRUST_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let contacts_db = env::var("TRUST_CONTACTS_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("contacts.sqlite"));
        let pending_requests_file = env::var("TRUST_PENDING_REQUESTS_FILE")
            .ok()
            .map(PathBuf::from);

        let directory_url = env::var("TRUST_HANDLE_DIRECTORY_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let default_privacy = match env::var("TRUST_DEFAULT_PRIVACY") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| AuthzError::Config(format!("Invalid default privacy: {}", raw)))?,
            Err(_) => PrivacySetting::Secret,
        };

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "contact_trust=debug,tower_http=debug".to_string());

        Ok(AgentConfig {
            service: ServiceConfig {
                host,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                contacts_db,
                pending_requests_file,
            },
            identity: IdentityConfig {
                directory_url,
                handle_cache_ttl_secs: env_or("TRUST_HANDLE_CACHE_TTL", 300),
                handle_cache_cleanup_secs: env_or("TRUST_HANDLE_CACHE_CLEANUP_INTERVAL", 3600),
                lookup_debounce_ms: env_or("TRUST_LOOKUP_DEBOUNCE_MS", 1000),
                lookup_timeout_secs: env_or("TRUST_LOOKUP_TIMEOUT", 10),
            },
            rate_limit: RateLimitConfig {
                lookups_per_second: env_or("TRUST_LOOKUPS_PER_SECOND", 5),
                burst_size: env_or("TRUST_LOOKUP_BURST", 10),
            },
            authorization: AuthorizationConfig {
                event_buffer: env_or("TRUST_EVENT_BUFFER", 256),
                command_buffer: env_or("TRUST_COMMAND_BUFFER", 64),
                default_privacy,
                own_extended_key: env::var("TRUST_EXTENDED_KEY").ok(),
            },
            logging: LoggingConfig {
                level: log_level,
                json: env::var("TRUST_LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthzResult<()> {
        if self.service.host.is_empty() {
            return Err(AuthzError::Config("Host cannot be empty".to_string()));
        }

        if let Some(url) = &self.identity.directory_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AuthzError::Config(format!(
                    "Handle directory URL must be http(s): {}",
                    url
                )));
            }
        }

        if self.authorization.default_privacy == PrivacySetting::Blocked {
            return Err(AuthzError::Config(
                "Default privacy cannot be 'blocked'".to_string(),
            ));
        }

        self.extended_key()?;

        if self.authorization.event_buffer == 0 || self.authorization.command_buffer == 0 {
            return Err(AuthzError::Config(
                "Event and command buffers must be non-zero".to_string(),
            ));
        }

        if self.rate_limit.lookups_per_second == 0 {
            return Err(AuthzError::Config(
                "Lookup rate must be at least one per second".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed extended key, if configured
    pub fn extended_key(&self) -> AuthzResult<Option<ExtendedPublicKey>> {
        self.authorization
            .own_extended_key
            .as_deref()
            .map(|raw| {
                ExtendedPublicKey::parse(raw)
                    .map_err(|e| AuthzError::Config(format!("Invalid TRUST_EXTENDED_KEY: {}", e)))
            })
            .transpose()
    }

    /// Address the HTTP API binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::default()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:4860");
    }

    #[test]
    fn test_blocked_default_privacy_rejected() {
        let mut config = config();
        config.authorization.default_privacy = PrivacySetting::Blocked;
        assert!(matches!(config.validate(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_directory_url_scheme() {
        let mut config = config();
        config.identity.directory_url = Some("names.local".to_string());
        assert!(config.validate().is_err());

        config.identity.directory_url = Some("https://names.local".to_string());
        assert!(config.validate().is_ok());
    }
}

