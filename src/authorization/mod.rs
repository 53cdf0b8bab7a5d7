//! Authorization request handling
//!
//! Inbound authorization messages are validated into immutable
//! [`AuthorizationRequest`] snapshots, kept in the
//! [`AuthorizationRegistry`] until the user settles them through the
//! [`DecisionProcessor`].

pub mod decision;
pub mod registry;
pub mod reply;

pub use decision::{
    Decision, DecisionProcessor, DecisionState, Outcome, OutboundMessage, Settlement,
    UserChoices, EXTENDED_KEY_REQUIRES_CONTACT,
};
pub use registry::{Admission, AuthorizationRegistry, RequestGroup, RequestSummary};
pub use reply::{compose_request, ReplyProcessor, ReplyResult};

use crate::{
    error::{AuthzError, AuthzResult},
    identity::{ExtendedPublicKey, PublicKey},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Requested permission bits
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityFlags(u16);

impl CapabilityFlags {
    pub const CHAT: CapabilityFlags = CapabilityFlags(0x01);
    pub const MAIL: CapabilityFlags = CapabilityFlags(0x02);
    pub const EXTENDED_KEY: CapabilityFlags = CapabilityFlags(0x100);

    pub const fn empty() -> Self {
        CapabilityFlags(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        CapabilityFlags(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn contains(&self, other: CapabilityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: CapabilityFlags) -> Self {
        CapabilityFlags(self.0 | other.0)
    }

    pub fn chat(&self) -> bool {
        self.contains(Self::CHAT)
    }

    pub fn mail(&self) -> bool {
        self.contains(Self::MAIL)
    }

    pub fn extended_key(&self) -> bool {
        self.contains(Self::EXTENDED_KEY)
    }
}

impl std::ops::BitOr for CapabilityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.chat() {
            names.push("CHAT");
        }
        if self.mail() {
            names.push("MAIL");
        }
        if self.extended_key() {
            names.push("EXTENDED_KEY");
        }
        write!(f, "CapabilityFlags({:#06x} {})", self.0, names.join("|"))
    }
}

/// Kind of authorization message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Request,
    Reply,
}

/// Status carried by a reply to one of our requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Accepted,
    Denied,
}

/// Authorization message as delivered by the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationMessage {
    #[serde(default)]
    pub kind: MessageKind,
    pub from_key: Option<String>,
    #[serde(default)]
    pub from_handle: String,
    #[serde(default)]
    pub from_first_name: String,
    #[serde(default)]
    pub from_last_name: String,
    /// Capability bitset
    pub request_param: Option<u16>,
    #[serde(default)]
    pub greeting_message: String,
    pub extended_pub_key: Option<String>,
    pub reply_status: Option<ReplyStatus>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl AuthorizationMessage {
    /// Request message from `from_key`
    pub fn request(from_key: &PublicKey, request_param: u16) -> Self {
        Self {
            kind: MessageKind::Request,
            from_key: Some(from_key.to_address()),
            from_handle: String::new(),
            from_first_name: String::new(),
            from_last_name: String::new(),
            request_param: Some(request_param),
            greeting_message: String::new(),
            extended_pub_key: None,
            reply_status: None,
            received_at: Utc::now(),
        }
    }

    /// Sender key, validated
    pub fn sender(&self) -> AuthzResult<PublicKey> {
        let raw = self
            .from_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AuthzError::MalformedRequest("missing sender key".to_string()))?;

        PublicKey::parse(raw)
            .map_err(|e| AuthzError::MalformedRequest(format!("bad sender key: {}", e)))
    }
}

/// Immutable snapshot of one pending authorization request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub id: Uuid,
    pub sender: PublicKey,
    pub first_name: String,
    pub last_name: String,
    /// Claimed handle, unverified
    pub handle: String,
    pub capabilities: CapabilityFlags,
    pub greeting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_key: Option<ExtendedPublicKey>,
    pub received_at: DateTime<Utc>,
    /// Admission order within the registry
    pub sequence: u64,
}

impl AuthorizationRequest {
    /// Validate an inbound request message
    ///
    /// Fails with `MalformedRequest` when the sender key or capability bitset
    /// is missing, or the extended key is absent or unreadable while its flag
    /// is set.
    pub fn from_message(msg: &AuthorizationMessage, sequence: u64) -> AuthzResult<Self> {
        if msg.kind != MessageKind::Request {
            return Err(AuthzError::MalformedRequest(
                "not an authorization request".to_string(),
            ));
        }

        let sender = msg.sender()?;

        let capabilities = msg
            .request_param
            .map(CapabilityFlags::from_bits)
            .ok_or_else(|| AuthzError::MalformedRequest("missing capability bitset".to_string()))?;

        let extended_key = if capabilities.extended_key() {
            let raw = msg
                .extended_pub_key
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    AuthzError::MalformedRequest(
                        "extended key flag set without a key".to_string(),
                    )
                })?;
            Some(ExtendedPublicKey::parse(raw).map_err(|e| {
                AuthzError::MalformedRequest(format!("bad extended key: {}", e))
            })?)
        } else {
            None
        };

        Ok(Self {
            id: Uuid::new_v4(),
            sender,
            first_name: msg.from_first_name.trim().to_string(),
            last_name: msg.from_last_name.trim().to_string(),
            handle: msg.from_handle.trim().to_string(),
            capabilities,
            greeting: msg.greeting_message.clone(),
            extended_key,
            received_at: msg.received_at,
            sequence,
        })
    }

    /// Name shown for the request
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if !full.is_empty() {
            full.to_string()
        } else if !self.handle.is_empty() {
            self.handle.clone()
        } else {
            self.sender.to_address()
        }
    }

    /// Whether an extended key can be accepted from this request
    pub fn offers_extended_key(&self) -> bool {
        self.capabilities.extended_key() && self.extended_key.is_some()
    }
}
