//! Identity Resolution System
//!
//! Classifies user-entered identifiers (handles or raw key addresses),
//! resolves handles through the handle directory, and caches bindings.

pub mod cache;
pub mod directory;
pub mod keys;
pub mod resolver;

pub use cache::HandleCache;
pub use directory::{HandleDirectory, HandleDirectoryConfig, HandleLookup};
pub use keys::{ExtendedPublicKey, PublicKey};
pub use resolver::{IdentityResolver, LookupTicket, ResolveStep, ResolverMode};

use crate::error::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum handle length
pub const MAX_HANDLE_LEN: usize = 63;

/// Human-readable name bound to a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Validate and normalize a handle
    pub fn parse(raw: &str) -> AuthzResult<Self> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(AuthzError::Validation("Handle cannot be empty".to_string()));
        }

        if trimmed.len() > MAX_HANDLE_LEN {
            return Err(AuthzError::Validation(format!(
                "Handle too long (max {} characters)",
                MAX_HANDLE_LEN
            )));
        }

        if !trimmed
            .chars()
            .next()
            .map(|c| c.is_ascii_alphanumeric())
            .unwrap_or(false)
        {
            return Err(AuthzError::Validation(
                "Handle must start with a letter or digit".to_string(),
            ));
        }

        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(AuthzError::Validation(
                "Handle contains invalid characters".to_string(),
            ));
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolutionState {
    /// Neither a registered handle nor a well-formed key
    Invalid,
    /// Matched a registered handle
    ResolvedHandle { handle: Handle, key: PublicKey },
    /// Parsed directly as a key address
    ResolvedKey { key: PublicKey },
    /// Resolved key is already in the contact store
    AlreadyContact { key: PublicKey },
}

impl ResolutionState {
    /// Resolved key, if any
    pub fn key(&self) -> Option<&PublicKey> {
        match self {
            ResolutionState::Invalid => None,
            ResolutionState::ResolvedHandle { key, .. }
            | ResolutionState::ResolvedKey { key }
            | ResolutionState::AlreadyContact { key } => Some(key),
        }
    }

    /// Whether the identity is good enough to create or update a contact
    pub fn permits_contact(&self) -> bool {
        !matches!(self, ResolutionState::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::keys::test_keys::key;
    use super::*;

    #[test]
    fn test_handle_normalization() {
        let handle = Handle::parse("  Alice.Smith ").unwrap();
        assert_eq!(handle.as_str(), "alice.smith");
    }

    #[test]
    fn test_handle_rejects_invalid() {
        assert!(Handle::parse("").is_err());
        assert!(Handle::parse("-alice").is_err());
        assert!(Handle::parse("alice smith").is_err());
        assert!(Handle::parse("alice@home").is_err());
        assert!(Handle::parse(&"a".repeat(MAX_HANDLE_LEN + 1)).is_err());
        assert!(Handle::parse(&"a".repeat(MAX_HANDLE_LEN)).is_ok());
    }

    #[test]
    fn test_resolution_state_serialization() {
        let state = ResolutionState::ResolvedKey { key: key(4) };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "resolved_key");
        assert_eq!(json["key"], key(4).to_address());
        assert!(!ResolutionState::Invalid.permits_contact());
        assert!(ResolutionState::AlreadyContact { key: key(4) }.permits_contact());
    }
}
