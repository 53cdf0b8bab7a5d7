//! Contact store boundary
//!
//! The address book is owned by the rest of the application. The
//! authorization core reads contacts by key and writes them through a single
//! create-or-update call.

pub mod memory;
pub mod store;

pub use memory::MemoryContactStore;
pub use store::SqliteContactStore;

use crate::{
    error::{AuthzError, AuthzResult},
    identity::{ExtendedPublicKey, PublicKey},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Contact visibility/trust tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacySetting {
    Public,
    #[default]
    Secret,
    Blocked,
}

impl PrivacySetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacySetting::Public => "public",
            PrivacySetting::Secret => "secret",
            PrivacySetting::Blocked => "blocked",
        }
    }
}

impl FromStr for PrivacySetting {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(PrivacySetting::Public),
            "secret" | "private" => Ok(PrivacySetting::Secret),
            "blocked" => Ok(PrivacySetting::Blocked),
            other => Err(AuthzError::Validation(format!(
                "Unknown privacy setting: {}",
                other
            ))),
        }
    }
}

/// Trusted peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub handle: String,
    pub public_key: PublicKey,
    pub privacy: PrivacySetting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_trx_address: Option<ExtendedPublicKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// New contact with the default privacy tier
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            handle: String::new(),
            public_key,
            privacy: PrivacySetting::default(),
            send_trx_address: None,
            icon: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.privacy == PrivacySetting::Blocked
    }
}

/// Address book collaborator
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Contact bound to `key`, if any
    async fn lookup_by_public_key(&self, key: &PublicKey) -> AuthzResult<Option<Contact>>;

    /// Create or update the contact addressed by its public key
    async fn upsert(&self, contact: &Contact) -> AuthzResult<()>;
}
