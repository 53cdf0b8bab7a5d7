//! Notifications published by the authorization agent
use crate::{
    authorization::{DecisionState, OutboundMessage, RequestSummary},
    identity::{PublicKey, ResolutionState},
};
use serde::Serialize;
use uuid::Uuid;

/// Which resolver a resolution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "sender", rename_all = "snake_case")]
pub enum ResolutionTarget {
    /// The editable recipient field for outgoing requests
    Compose,
    /// The read-only identity of a pending request's sender
    Request(PublicKey),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    ResolutionChanged {
        target: ResolutionTarget,
        identifier: String,
        state: ResolutionState,
    },
    RequestAdmitted {
        request: RequestSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced: Option<Uuid>,
    },
    RequestRemoved {
        id: Uuid,
    },
    Decided {
        id: Uuid,
        sender: PublicKey,
        state: DecisionState,
    },
    ContactSaved {
        key: PublicKey,
    },
    /// Message for the transport layer to deliver
    Outbound {
        message: OutboundMessage,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::ResolutionChanged { .. } => "resolution_changed",
            AgentEvent::RequestAdmitted { .. } => "request_admitted",
            AgentEvent::RequestRemoved { .. } => "request_removed",
            AgentEvent::Decided { .. } => "decided",
            AgentEvent::ContactSaved { .. } => "contact_saved",
            AgentEvent::Outbound { .. } => "outbound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keys::test_keys::key;

    #[test]
    fn test_event_json_shape() {
        let event = AgentEvent::ResolutionChanged {
            target: ResolutionTarget::Request(key(1)),
            identifier: "alice".to_string(),
            state: ResolutionState::ResolvedKey { key: key(1) },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "resolution_changed");
        assert_eq!(json["target"]["kind"], "request");
        assert_eq!(json["target"]["sender"], key(1).to_address());
        assert_eq!(json["state"]["state"], "resolved_key");
        assert_eq!(event.name(), "resolution_changed");
    }
}
