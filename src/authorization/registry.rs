//! Pending authorization request registry
//!
//! Requests are keyed by sender public key. Display grouping is a projection
//! rebuilt on demand, never the source of truth.
use crate::{
    authorization::{AuthorizationMessage, AuthorizationRequest, CapabilityFlags},
    error::AuthzResult,
    identity::PublicKey,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Label of the single root group
pub const PENDING_GROUP_LABEL: &str = "Requests";

/// Result of admitting a message
#[derive(Debug, Clone)]
pub struct Admission {
    pub request: AuthorizationRequest,
    /// Prior request from the same sender, discarded
    pub replaced: Option<AuthorizationRequest>,
}

/// One row of the pending-requests projection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub id: Uuid,
    pub sender: PublicKey,
    pub display_name: String,
    pub handle: String,
    pub capabilities: CapabilityFlags,
    pub received_at: DateTime<Utc>,
}

impl From<&AuthorizationRequest> for RequestSummary {
    fn from(request: &AuthorizationRequest) -> Self {
        Self {
            id: request.id,
            sender: request.sender,
            display_name: request.display_name(),
            handle: request.handle.clone(),
            capabilities: request.capabilities,
            received_at: request.received_at,
        }
    }
}

/// Pending-requests root group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestGroup {
    pub label: String,
    pub entries: Vec<RequestSummary>,
}

#[derive(Debug, Default)]
pub struct AuthorizationRegistry {
    by_sender: HashMap<PublicKey, AuthorizationRequest>,
    by_id: HashMap<Uuid, PublicKey>,
    next_sequence: u64,
}

impl AuthorizationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an inbound request, replacing any pending one from the same sender
    pub fn admit(&mut self, msg: &AuthorizationMessage) -> AuthzResult<Admission> {
        let request = AuthorizationRequest::from_message(msg, self.next_sequence)?;
        self.next_sequence += 1;

        let replaced = self.by_sender.remove(&request.sender);
        if let Some(old) = &replaced {
            self.by_id.remove(&old.id);
            debug!(
                "Replacing request {} from {} with {}",
                old.id, request.sender, request.id
            );
        }

        self.by_id.insert(request.id, request.sender);
        self.by_sender.insert(request.sender, request.clone());

        info!(
            "Admitted authorization request {} from {} ({:?})",
            request.id, request.sender, request.capabilities
        );

        Ok(Admission { request, replaced })
    }

    /// Re-admit stored requests at startup, oldest first
    ///
    /// Malformed entries are skipped. Returns the admissions that survived
    /// (later duplicates replace earlier ones).
    pub fn restore<'a, I>(&mut self, messages: I) -> Vec<Admission>
    where
        I: IntoIterator<Item = &'a AuthorizationMessage>,
    {
        let mut ordered: Vec<&AuthorizationMessage> = messages.into_iter().collect();
        ordered.sort_by_key(|m| m.received_at);

        let mut admitted = Vec::new();
        for msg in ordered {
            match self.admit(msg) {
                Ok(admission) => admitted.push(admission),
                Err(e) => warn!("Skipping stored authorization message: {}", e),
            }
        }

        admitted.retain(|a| self.get(&a.request.id).is_some());
        admitted
    }

    pub fn find_by_sender(&self, key: &PublicKey) -> Option<&AuthorizationRequest> {
        self.by_sender.get(key)
    }

    pub fn get(&self, id: &Uuid) -> Option<&AuthorizationRequest> {
        self.by_id.get(id).and_then(|key| self.by_sender.get(key))
    }

    /// Detach a request; a no-op when it is already gone
    pub fn remove(&mut self, id: &Uuid) -> Option<AuthorizationRequest> {
        let key = self.by_id.remove(id)?;
        let removed = self.by_sender.remove(&key);
        if removed.is_some() {
            debug!("Removed authorization request {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sender.is_empty()
    }

    /// Pending requests in arrival order
    pub fn pending(&self) -> Vec<&AuthorizationRequest> {
        let mut requests: Vec<&AuthorizationRequest> = self.by_sender.values().collect();
        requests.sort_by_key(|r| r.sequence);
        requests
    }

    /// Display projection: one root group holding every pending request
    pub fn pending_group(&self) -> RequestGroup {
        RequestGroup {
            label: PENDING_GROUP_LABEL.to_string(),
            entries: self.pending().into_iter().map(RequestSummary::from).collect(),
        }
    }
}
