//! Replies to our own requests, and composing outgoing requests
use crate::{
    authorization::{
        AuthorizationMessage, CapabilityFlags, MessageKind, OutboundMessage, ReplyStatus,
    },
    contacts::{Contact, ContactStore},
    error::{AuthzError, AuthzResult},
    identity::{ExtendedPublicKey, ResolutionState},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reply did
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyResult {
    /// The contact's extended send address was stored
    Updated(Contact),
    Ignored(&'static str),
}

/// Applies inbound replies to the contact store
#[derive(Clone)]
pub struct ReplyProcessor {
    contacts: Arc<dyn ContactStore>,
}

impl ReplyProcessor {
    pub fn new(contacts: Arc<dyn ContactStore>) -> Self {
        Self { contacts }
    }

    pub async fn process(&self, msg: &AuthorizationMessage) -> AuthzResult<ReplyResult> {
        if msg.kind != MessageKind::Reply {
            return Err(AuthzError::MalformedRequest("not a reply".to_string()));
        }

        let sender = msg.sender()?;

        if msg.reply_status != Some(ReplyStatus::Accepted) {
            info!("Authorization reply from {}: {:?}", sender, msg.reply_status);
            return Ok(ReplyResult::Ignored("not accepted"));
        }

        let Some(raw) = msg.extended_pub_key.as_deref().filter(|s| !s.trim().is_empty()) else {
            debug!("Accepted reply from {} carries no extended key", sender);
            return Ok(ReplyResult::Ignored("no extended key"));
        };

        let extended = ExtendedPublicKey::parse(raw)
            .map_err(|e| AuthzError::MalformedRequest(format!("bad extended key: {}", e)))?;

        let Some(mut contact) = self.contacts.lookup_by_public_key(&sender).await? else {
            warn!("Ignoring reply from {}: not a contact", sender);
            return Ok(ReplyResult::Ignored("unknown sender"));
        };

        contact.send_trx_address = Some(extended);
        contact.updated_at = Utc::now();
        self.contacts.upsert(&contact).await?;

        info!("Stored extended send address for {}", sender);
        Ok(ReplyResult::Updated(contact))
    }
}

/// Build our authorization request for the compose field's resolution
///
/// Attaching `own_extended_key` sets the EXTENDED_KEY capability.
pub fn compose_request(
    resolution: &ResolutionState,
    capabilities: CapabilityFlags,
    greeting: &str,
    own_extended_key: Option<ExtendedPublicKey>,
) -> AuthzResult<OutboundMessage> {
    let (to, handle) = match resolution {
        ResolutionState::ResolvedHandle { handle, key } => (*key, Some(handle.clone())),
        ResolutionState::ResolvedKey { key } | ResolutionState::AlreadyContact { key } => {
            (*key, None)
        }
        ResolutionState::Invalid => {
            return Err(AuthzError::Validation(
                "Recipient identifier does not resolve to a key".to_string(),
            ))
        }
    };

    let capabilities = match &own_extended_key {
        Some(_) => capabilities | CapabilityFlags::EXTENDED_KEY,
        None if capabilities.extended_key() => {
            return Err(AuthzError::Validation(
                "EXTENDED_KEY requested without an extended key to send".to_string(),
            ))
        }
        None => capabilities,
    };

    if capabilities.bits() == 0 {
        return Err(AuthzError::Validation("No capabilities requested".to_string()));
    }

    Ok(OutboundMessage::SendRequest {
        to,
        handle,
        capabilities,
        greeting: greeting.to_string(),
        extended_key: own_extended_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::MemoryContactStore;
    use crate::identity::keys::test_keys::{extended, key};
    use crate::identity::Handle;

    fn reply(seed: u8, status: ReplyStatus, with_key: bool) -> AuthorizationMessage {
        let mut msg = AuthorizationMessage::request(&key(seed), 0x100);
        msg.kind = MessageKind::Reply;
        msg.reply_status = Some(status);
        if with_key {
            msg.extended_pub_key = Some(extended(seed).encode());
        }
        msg
    }

    #[tokio::test]
    async fn test_accepted_reply_updates_contact() {
        let store = Arc::new(MemoryContactStore::with_contacts([Contact::new(key(1))]));
        let processor = ReplyProcessor::new(store.clone());

        let result = processor
            .process(&reply(1, ReplyStatus::Accepted, true))
            .await
            .unwrap();
        assert!(matches!(result, ReplyResult::Updated(_)));

        let contact = store.lookup_by_public_key(&key(1)).await.unwrap().unwrap();
        assert_eq!(contact.send_trx_address, Some(extended(1)));
    }

    #[tokio::test]
    async fn test_reply_from_stranger_ignored() {
        let store = Arc::new(MemoryContactStore::new());
        let processor = ReplyProcessor::new(store.clone());

        let result = processor
            .process(&reply(2, ReplyStatus::Accepted, true))
            .await
            .unwrap();
        assert_eq!(result, ReplyResult::Ignored("unknown sender"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_reply_ignored() {
        let store = Arc::new(MemoryContactStore::with_contacts([Contact::new(key(3))]));
        let processor = ReplyProcessor::new(store.clone());

        let result = processor
            .process(&reply(3, ReplyStatus::Denied, true))
            .await
            .unwrap();
        assert_eq!(result, ReplyResult::Ignored("not accepted"));
    }

    #[test]
    fn test_compose_to_resolved_handle() {
        let resolution = ResolutionState::ResolvedHandle {
            handle: Handle::parse("bob").unwrap(),
            key: key(4),
        };

        let msg = compose_request(&resolution, CapabilityFlags::CHAT, "hi", Some(extended(9)))
            .unwrap();
        match msg {
            OutboundMessage::SendRequest {
                to,
                handle,
                capabilities,
                extended_key,
                ..
            } => {
                assert_eq!(to, key(4));
                assert_eq!(handle.unwrap().as_str(), "bob");
                assert!(capabilities.chat() && capabilities.extended_key());
                assert_eq!(extended_key, Some(extended(9)));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_compose_rejects_unresolved() {
        assert!(compose_request(&ResolutionState::Invalid, CapabilityFlags::CHAT, "", None).is_err());

        let resolution = ResolutionState::ResolvedKey { key: key(5) };
        assert!(
            compose_request(&resolution, CapabilityFlags::EXTENDED_KEY, "", None).is_err()
        );
        assert!(compose_request(&resolution, CapabilityFlags::empty(), "", None).is_err());
    }
}
