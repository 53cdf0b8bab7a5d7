//! Authorization decision processing
//!
//! A pending request moves `Pending → {Accepted, Denied, Blocked}` exactly
//! once. Every check runs before the contact store or the registry is
//! touched, and the request only leaves the registry after the contact write
//! succeeded, so a failed Accept can be retried unchanged.
use crate::{
    authorization::{AuthorizationRegistry, AuthorizationRequest, CapabilityFlags},
    contacts::{Contact, ContactStore, PrivacySetting},
    error::{AuthzError, AuthzResult},
    identity::{ExtendedPublicKey, Handle, PublicKey, ResolutionState},
    metrics,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reason reported when an extended key is accepted without a contact
pub const EXTENDED_KEY_REQUIRES_CONTACT: &str =
    "To accept the extended public key the sender must be added as a contact";

/// User decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Deny,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Deny => "deny",
            Decision::Block => "block",
        }
    }
}

/// Options chosen alongside an Accept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserChoices {
    pub add_as_contact: bool,
    pub accept_extended_key: bool,
    /// Overrides the default privacy tier for the created contact
    pub privacy: Option<PrivacySetting>,
    pub icon: Option<String>,
}

/// Lifecycle of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Pending,
    Accepted,
    Denied,
    Blocked,
}

/// Terminal outcome of a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "request", rename_all = "snake_case")]
pub enum Outcome {
    Accepted(AuthorizationRequest),
    Denied(AuthorizationRequest),
    Blocked(AuthorizationRequest),
}

impl Outcome {
    pub fn request(&self) -> &AuthorizationRequest {
        match self {
            Outcome::Accepted(r) | Outcome::Denied(r) | Outcome::Blocked(r) => r,
        }
    }

    pub fn state(&self) -> DecisionState {
        match self {
            Outcome::Accepted(_) => DecisionState::Accepted,
            Outcome::Denied(_) => DecisionState::Denied,
            Outcome::Blocked(_) => DecisionState::Blocked,
        }
    }
}

/// Messages the transport layer is asked to deliver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Tell the sender their extended key was accepted
    ExtendedKeyAccepted { to: PublicKey },
    /// Record the sender on the block list
    BlockSender { key: PublicKey },
    /// Our own authorization request to a peer
    SendRequest {
        to: PublicKey,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<Handle>,
        capabilities: CapabilityFlags,
        greeting: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        extended_key: Option<ExtendedPublicKey>,
    },
}

/// Everything a finished decision produced
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub outcome: Outcome,
    /// Contact as written to the store
    pub contact: Option<Contact>,
    pub outbound: Vec<OutboundMessage>,
}

/// Executes decisions against the registry and the contact store
#[derive(Clone)]
pub struct DecisionProcessor {
    contacts: Arc<dyn ContactStore>,
    default_privacy: PrivacySetting,
}

impl DecisionProcessor {
    pub fn new(contacts: Arc<dyn ContactStore>) -> Self {
        Self {
            contacts,
            default_privacy: PrivacySetting::Secret,
        }
    }

    /// Privacy tier used when the caller does not override it
    pub fn with_default_privacy(mut self, privacy: PrivacySetting) -> Self {
        if privacy != PrivacySetting::Blocked {
            self.default_privacy = privacy;
        }
        self
    }

    /// Settle request `id`
    ///
    /// `resolution` is the sender's current resolution state. Returns
    /// `Ok(None)` when a Deny or Block targets a request that is already gone.
    pub async fn decide(
        &self,
        registry: &mut AuthorizationRegistry,
        id: &Uuid,
        decision: Decision,
        choices: &UserChoices,
        resolution: &ResolutionState,
    ) -> AuthzResult<Option<Settlement>> {
        let Some(request) = registry.get(id).cloned() else {
            return match decision {
                Decision::Accept => {
                    metrics::DECISIONS_TOTAL
                        .with_label_values(&[decision.as_str(), "vanished"])
                        .inc();
                    Err(AuthzError::RequestVanished(id.to_string()))
                }
                Decision::Deny | Decision::Block => {
                    debug!("{} on settled request {} ignored", decision.as_str(), id);
                    Ok(None)
                }
            };
        };

        let result = match decision {
            Decision::Accept => self.accept(registry, request, choices, resolution).await,
            Decision::Deny => Ok(Self::deny(registry, request)),
            Decision::Block => Ok(Self::block(registry, request)),
        };

        let label = match &result {
            Ok(_) => "ok",
            Err(AuthzError::InvalidDecision(_)) => "invalid",
            Err(AuthzError::StoreWriteFailure(_)) => "store_failure",
            Err(_) => "error",
        };
        metrics::DECISIONS_TOTAL
            .with_label_values(&[decision.as_str(), label])
            .inc();

        result.map(Some)
    }

    /// Check an Accept without side effects
    ///
    /// `existing` is the sender's current contact, if any.
    pub fn validate_accept(
        request: &AuthorizationRequest,
        choices: &UserChoices,
        resolution: &ResolutionState,
        existing: Option<&Contact>,
    ) -> AuthzResult<()> {
        if let Some(key) = resolution.key() {
            if key != &request.sender {
                return Err(AuthzError::InvalidDecision(
                    "Resolved identity does not match the request sender".to_string(),
                ));
            }
        }

        if choices.privacy == Some(PrivacySetting::Blocked) {
            return Err(AuthzError::InvalidDecision(
                "An accepted contact cannot be blocked; use Block instead".to_string(),
            ));
        }

        if choices.add_as_contact && !resolution.permits_contact() {
            return Err(AuthzError::InvalidDecision(
                "The sender's identity could not be validated".to_string(),
            ));
        }

        if choices.accept_extended_key {
            if !request.offers_extended_key() {
                return Err(AuthzError::InvalidDecision(
                    "The request carries no extended public key".to_string(),
                ));
            }

            if !choices.add_as_contact && existing.is_none() {
                return Err(AuthzError::InvalidDecision(
                    EXTENDED_KEY_REQUIRES_CONTACT.to_string(),
                ));
            }
        }

        Ok(())
    }

    async fn accept(
        &self,
        registry: &mut AuthorizationRegistry,
        request: AuthorizationRequest,
        choices: &UserChoices,
        resolution: &ResolutionState,
    ) -> AuthzResult<Settlement> {
        let existing = self.contacts.lookup_by_public_key(&request.sender).await?;
        Self::validate_accept(&request, choices, resolution, existing.as_ref())?;

        let mut contact = if choices.add_as_contact {
            Some(self.contact_from_request(&request, choices, resolution, existing.clone()))
        } else {
            None
        };

        if choices.accept_extended_key {
            let target = contact.get_or_insert_with(|| {
                // Validated above: an existing contact is present here
                existing
                    .clone()
                    .unwrap_or_else(|| Contact::new(request.sender))
            });
            target.send_trx_address = request.extended_key.clone();
        }

        // Single write: contact fields and extended key land together or not at all
        if let Some(contact) = contact.as_mut() {
            contact.updated_at = Utc::now();
            self.contacts.upsert(contact).await.map_err(|e| {
                warn!("Contact write for {} failed: {}", request.sender, e);
                match e {
                    AuthzError::StoreWriteFailure(_) => e,
                    other => AuthzError::StoreWriteFailure(other.to_string()),
                }
            })?;
        }

        registry.remove(&request.id);

        let mut outbound = Vec::new();
        if choices.accept_extended_key {
            outbound.push(OutboundMessage::ExtendedKeyAccepted { to: request.sender });
        }

        info!(
            "Accepted authorization request {} from {} (contact: {}, extended key: {})",
            request.id,
            request.sender,
            contact.is_some(),
            choices.accept_extended_key
        );

        Ok(Settlement {
            outcome: Outcome::Accepted(request),
            contact,
            outbound,
        })
    }

    fn deny(registry: &mut AuthorizationRegistry, request: AuthorizationRequest) -> Settlement {
        registry.remove(&request.id);
        info!("Denied authorization request {} from {}", request.id, request.sender);

        Settlement {
            outcome: Outcome::Denied(request),
            contact: None,
            outbound: Vec::new(),
        }
    }

    fn block(registry: &mut AuthorizationRegistry, request: AuthorizationRequest) -> Settlement {
        registry.remove(&request.id);
        info!("Blocked authorization request {} from {}", request.id, request.sender);

        let key = request.sender;
        Settlement {
            outcome: Outcome::Blocked(request),
            contact: None,
            outbound: vec![OutboundMessage::BlockSender { key }],
        }
    }

    /// Contact built from the request's claimed fields
    ///
    /// An existing contact keeps its own non-empty fields.
    fn contact_from_request(
        &self,
        request: &AuthorizationRequest,
        choices: &UserChoices,
        resolution: &ResolutionState,
        existing: Option<Contact>,
    ) -> Contact {
        let handle = match resolution {
            ResolutionState::ResolvedHandle { handle, .. } => handle.to_string(),
            _ => request.handle.clone(),
        };

        let mut contact = match existing {
            Some(existing) => existing,
            None => {
                let mut fresh = Contact::new(request.sender);
                fresh.privacy = self.default_privacy;
                fresh
            }
        };

        fill_if_empty(&mut contact.first_name, &request.first_name);
        fill_if_empty(&mut contact.last_name, &request.last_name);
        fill_if_empty(&mut contact.handle, &handle);

        if let Some(privacy) = choices.privacy {
            contact.privacy = privacy;
        } else if contact.is_blocked() {
            contact.privacy = self.default_privacy;
        }

        if choices.icon.is_some() {
            contact.icon = choices.icon.clone();
        }

        contact
    }
}

fn fill_if_empty(field: &mut String, value: &str) {
    if field.trim().is_empty() {
        *field = value.to_string();
    }
}
