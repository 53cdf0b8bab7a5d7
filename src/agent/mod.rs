//! Authorization agent
//!
//! A single owner task holds the request registry and every identity
//! resolver, and processes [`Command`]s in arrival order. Handle lookups run
//! on spawned tasks and report back to the owner, which discards results
//! whose identifier is no longer current. Callers talk to the owner through
//! the cloneable [`AgentHandle`].

pub mod events;

pub use events::{AgentEvent, ResolutionTarget};

use crate::{
    authorization::{
        compose_request, AuthorizationMessage, AuthorizationRegistry, AuthorizationRequest,
        CapabilityFlags, Decision, DecisionProcessor, MessageKind, Outcome, OutboundMessage,
        ReplyProcessor, ReplyResult, RequestGroup, RequestSummary, Settlement, UserChoices,
    },
    contacts::{ContactStore, PrivacySetting},
    error::{AuthzError, AuthzResult},
    identity::{
        resolver::DEFAULT_DEBOUNCE, ExtendedPublicKey, HandleLookup, IdentityResolver,
        LookupTicket, PublicKey, ResolutionState, ResolveStep, ResolverMode,
    },
    metrics,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Agent tuning
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub debounce: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
    pub default_privacy: PrivacySetting,
    /// Our extended key, attached to outgoing requests on demand
    pub own_extended_key: Option<ExtendedPublicKey>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            command_buffer: 64,
            event_buffer: 256,
            default_privacy: PrivacySetting::Secret,
            own_extended_key: None,
        }
    }
}

/// What happened to a delivered message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Delivery {
    Admitted {
        request: RequestSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced: Option<Uuid>,
    },
    /// Sender is blocked
    Suppressed,
    Reply {
        updated: bool,
    },
}

/// A pending request with its sender's current resolution
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub request: AuthorizationRequest,
    pub resolution: ResolutionState,
}

/// Compose field state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierView {
    pub identifier: String,
    pub state: ResolutionState,
    pub lookup_pending: bool,
    pub allows_contact_edit: bool,
}

/// Commands processed by the owner task
pub enum Command {
    Deliver {
        message: AuthorizationMessage,
        reply: oneshot::Sender<AuthzResult<Delivery>>,
    },
    EditIdentifier {
        identifier: String,
        reply: oneshot::Sender<AuthzResult<IdentifierView>>,
    },
    Decide {
        id: Uuid,
        decision: Decision,
        choices: UserChoices,
        reply: oneshot::Sender<AuthzResult<Option<Settlement>>>,
    },
    Dismiss {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Pending {
        reply: oneshot::Sender<RequestGroup>,
    },
    Get {
        id: Uuid,
        reply: oneshot::Sender<Option<RequestView>>,
    },
    Compose {
        capabilities: CapabilityFlags,
        greeting: String,
        attach_extended_key: bool,
        reply: oneshot::Sender<AuthzResult<OutboundMessage>>,
    },
}

/// Finished handle lookup on its way back to the owner
struct LookupDone {
    target: ResolutionTarget,
    ticket: LookupTicket,
    result: AuthzResult<Option<PublicKey>>,
}

/// Cloneable client of the owner task
#[derive(Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> AuthzResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| AuthzError::AgentUnavailable)?;
        rx.await.map_err(|_| AuthzError::AgentUnavailable)
    }

    /// Hand an inbound message from the transport to the agent
    pub async fn deliver(&self, message: AuthorizationMessage) -> AuthzResult<Delivery> {
        self.call(|reply| Command::Deliver { message, reply }).await?
    }

    /// Update the compose field
    pub async fn edit_identifier(&self, identifier: impl Into<String>) -> AuthzResult<IdentifierView> {
        let identifier = identifier.into();
        self.call(|reply| Command::EditIdentifier { identifier, reply })
            .await?
    }

    pub async fn decide(
        &self,
        id: Uuid,
        decision: Decision,
        choices: UserChoices,
    ) -> AuthzResult<Option<Settlement>> {
        self.call(|reply| Command::Decide {
            id,
            decision,
            choices,
            reply,
        })
        .await?
    }

    /// Drop a request without recording a decision
    pub async fn dismiss(&self, id: Uuid) -> AuthzResult<bool> {
        self.call(|reply| Command::Dismiss { id, reply }).await
    }

    pub async fn pending(&self) -> AuthzResult<RequestGroup> {
        self.call(|reply| Command::Pending { reply }).await
    }

    pub async fn get(&self, id: Uuid) -> AuthzResult<Option<RequestView>> {
        self.call(|reply| Command::Get { id, reply }).await
    }

    /// Build an outgoing request to the compose field's recipient
    pub async fn compose(
        &self,
        capabilities: CapabilityFlags,
        greeting: impl Into<String>,
        attach_extended_key: bool,
    ) -> AuthzResult<OutboundMessage> {
        let greeting = greeting.into();
        self.call(|reply| Command::Compose {
            capabilities,
            greeting,
            attach_extended_key,
            reply,
        })
        .await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

pub struct AuthorizationAgent {
    registry: AuthorizationRegistry,
    /// Read-only resolvers keyed by request sender
    resolvers: HashMap<PublicKey, IdentityResolver>,
    compose: IdentityResolver,
    /// Senders blocked during this session
    blocked: HashSet<PublicKey>,
    contacts: Arc<dyn ContactStore>,
    lookup: Arc<dyn HandleLookup>,
    decisions: DecisionProcessor,
    replies: ReplyProcessor,
    options: AgentOptions,
    commands: mpsc::Receiver<Command>,
    lookups_tx: mpsc::UnboundedSender<LookupDone>,
    lookups_rx: mpsc::UnboundedReceiver<LookupDone>,
    events: broadcast::Sender<AgentEvent>,
}

impl AuthorizationAgent {
    /// Create the agent and its handle; call [`run`](Self::run) to start it
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        lookup: Arc<dyn HandleLookup>,
        options: AgentOptions,
    ) -> (Self, AgentHandle) {
        let (commands_tx, commands) = mpsc::channel(options.command_buffer.max(1));
        let (events, _) = broadcast::channel(options.event_buffer.max(1));
        let (lookups_tx, lookups_rx) = mpsc::unbounded_channel();

        let decisions =
            DecisionProcessor::new(contacts.clone()).with_default_privacy(options.default_privacy);
        let replies = ReplyProcessor::new(contacts.clone());

        let agent = Self {
            registry: AuthorizationRegistry::new(),
            resolvers: HashMap::new(),
            compose: IdentityResolver::new(ResolverMode::Editable, options.debounce),
            blocked: HashSet::new(),
            contacts,
            lookup,
            decisions,
            replies,
            options,
            commands,
            lookups_tx,
            lookups_rx,
            events: events.clone(),
        };

        let handle = AgentHandle {
            commands: commands_tx,
            events,
        };

        (agent, handle)
    }

    /// Create the agent and run it on a new task
    pub fn spawn(
        contacts: Arc<dyn ContactStore>,
        lookup: Arc<dyn HandleLookup>,
        options: AgentOptions,
    ) -> AgentHandle {
        let (agent, handle) = Self::new(contacts, lookup, options);
        tokio::spawn(agent.run());
        handle
    }

    /// Re-admit requests stored by the transport before the agent starts
    pub async fn restore(&mut self, messages: &[AuthorizationMessage]) -> AuthzResult<usize> {
        let mut allowed = Vec::with_capacity(messages.len());
        for message in messages {
            if let Ok(sender) = message.sender() {
                if self.is_blocked(&sender).await? {
                    debug!("Not restoring request from blocked sender {}", sender);
                    continue;
                }
            }
            allowed.push(message);
        }

        let admissions = self.registry.restore(allowed);
        for admission in &admissions {
            self.start_request_resolution(&admission.request).await?;
        }

        metrics::PENDING_REQUESTS.set(self.registry.len() as i64);
        info!("Restored {} pending authorization requests", admissions.len());
        Ok(admissions.len())
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!("Authorization agent started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(done) = self.lookups_rx.recv() => self.finish_lookup(done).await,
            }
        }

        info!("Authorization agent stopped");
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver just means the caller went away
        match command {
            Command::Deliver { message, reply } => {
                let _ = reply.send(self.deliver(message).await);
            }
            Command::EditIdentifier { identifier, reply } => {
                let _ = reply.send(self.edit_identifier(&identifier).await);
            }
            Command::Decide {
                id,
                decision,
                choices,
                reply,
            } => {
                let _ = reply.send(self.decide(id, decision, choices).await);
            }
            Command::Dismiss { id, reply } => {
                let _ = reply.send(self.dismiss(&id));
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.registry.pending_group());
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.view(&id));
            }
            Command::Compose {
                capabilities,
                greeting,
                attach_extended_key,
                reply,
            } => {
                let _ = reply.send(self.compose(capabilities, &greeting, attach_extended_key));
            }
        }
    }

    async fn deliver(&mut self, message: AuthorizationMessage) -> AuthzResult<Delivery> {
        match message.kind {
            MessageKind::Reply => {
                let updated = match self.replies.process(&message).await? {
                    ReplyResult::Updated(contact) => {
                        self.emit(AgentEvent::ContactSaved {
                            key: contact.public_key,
                        });
                        self.refresh_resolvers().await;
                        true
                    }
                    ReplyResult::Ignored(reason) => {
                        debug!("Reply ignored: {}", reason);
                        false
                    }
                };
                Ok(Delivery::Reply { updated })
            }
            MessageKind::Request => self.admit(message).await,
        }
    }

    async fn admit(&mut self, message: AuthorizationMessage) -> AuthzResult<Delivery> {
        let sender = message.sender().map_err(|e| {
            metrics::record_rejection("malformed");
            warn!("Rejected authorization message: {}", e);
            e
        })?;

        if self.is_blocked(&sender).await? {
            metrics::record_rejection("blocked");
            warn!("Suppressed authorization request from blocked sender {}", sender);
            return Ok(Delivery::Suppressed);
        }

        let admission = self.registry.admit(&message).map_err(|e| {
            metrics::record_rejection("malformed");
            warn!("Rejected authorization request from {}: {}", sender, e);
            e
        })?;

        metrics::REQUESTS_ADMITTED_TOTAL.inc();
        metrics::PENDING_REQUESTS.set(self.registry.len() as i64);

        let replaced = admission.replaced.as_ref().map(|r| r.id);
        if let Some(id) = replaced {
            self.emit(AgentEvent::RequestRemoved { id });
        }

        let summary = RequestSummary::from(&admission.request);
        self.emit(AgentEvent::RequestAdmitted {
            request: summary.clone(),
            replaced,
        });

        self.start_request_resolution(&admission.request).await?;

        Ok(Delivery::Admitted {
            request: summary,
            replaced,
        })
    }

    /// Fresh sender-bound resolver for `request`, fed its claimed handle
    async fn start_request_resolution(&mut self, request: &AuthorizationRequest) -> AuthzResult<()> {
        let mut resolver = IdentityResolver::for_sender(request.sender, self.options.debounce);
        let identifier = if request.handle.is_empty() {
            request.sender.to_address()
        } else {
            request.handle.clone()
        };

        let step = resolver.resolve(&identifier, self.contacts.as_ref()).await?;
        self.resolvers.insert(request.sender, resolver);

        // A provisional key classification is visible through `get` only;
        // the event is sent once the claimed handle has been checked
        let target = ResolutionTarget::Request(request.sender);
        match step {
            ResolveStep::Settled(state) => self.emit(AgentEvent::ResolutionChanged {
                target,
                identifier,
                state,
            }),
            ResolveStep::Lookup(ticket) => self.spawn_lookup(target, ticket),
            ResolveStep::Suppressed => {}
        }

        Ok(())
    }

    async fn edit_identifier(&mut self, identifier: &str) -> AuthzResult<IdentifierView> {
        match self.compose.resolve(identifier, self.contacts.as_ref()).await? {
            ResolveStep::Settled(state) => {
                self.emit(AgentEvent::ResolutionChanged {
                    target: ResolutionTarget::Compose,
                    identifier: self.compose.current().to_string(),
                    state,
                });
            }
            ResolveStep::Lookup(ticket) => self.spawn_lookup(ResolutionTarget::Compose, ticket),
            ResolveStep::Suppressed => {}
        }

        Ok(self.identifier_view())
    }

    fn identifier_view(&self) -> IdentifierView {
        IdentifierView {
            identifier: self.compose.current().to_string(),
            state: self.compose.state().clone(),
            lookup_pending: self.compose.is_lookup_pending(),
            allows_contact_edit: self.compose.allows_contact_edit(),
        }
    }

    fn spawn_lookup(&self, target: ResolutionTarget, ticket: LookupTicket) {
        debug!("Looking up handle {} for {:?}", ticket.handle, target);

        let lookup = self.lookup.clone();
        let done = self.lookups_tx.clone();
        tokio::spawn(async move {
            let result = lookup.lookup_by_handle(&ticket.handle).await;
            // Receiver only closes when the agent has stopped
            let _ = done.send(LookupDone {
                target,
                ticket,
                result,
            });
        });
    }

    async fn finish_lookup(&mut self, done: LookupDone) {
        let resolver = match &done.target {
            ResolutionTarget::Compose => &mut self.compose,
            ResolutionTarget::Request(sender) => match self.resolvers.get_mut(sender) {
                Some(resolver) => resolver,
                None => {
                    debug!("Dropping lookup for settled request from {}", sender);
                    metrics::STALE_LOOKUPS_TOTAL.inc();
                    return;
                }
            },
        };

        match resolver
            .complete_lookup(done.ticket, done.result, self.contacts.as_ref())
            .await
        {
            Ok(Some(state)) => {
                let identifier = resolver.current().to_string();
                self.emit(AgentEvent::ResolutionChanged {
                    target: done.target,
                    identifier,
                    state,
                });
            }
            Ok(None) => metrics::STALE_LOOKUPS_TOTAL.inc(),
            Err(e) => warn!("Failed to apply handle lookup: {}", e),
        }
    }

    async fn decide(
        &mut self,
        id: Uuid,
        decision: Decision,
        choices: UserChoices,
    ) -> AuthzResult<Option<Settlement>> {
        let resolution = self
            .registry
            .get(&id)
            .and_then(|request| self.resolvers.get(&request.sender))
            .map(|resolver| resolver.state().clone())
            .unwrap_or(ResolutionState::Invalid);

        let Some(settlement) = self
            .decisions
            .decide(&mut self.registry, &id, decision, &choices, &resolution)
            .await?
        else {
            return Ok(None);
        };

        let sender = settlement.outcome.request().sender;
        self.resolvers.remove(&sender);
        metrics::PENDING_REQUESTS.set(self.registry.len() as i64);

        if let Outcome::Blocked(_) = settlement.outcome {
            self.blocked.insert(sender);
        }

        self.emit(AgentEvent::RequestRemoved { id });
        self.emit(AgentEvent::Decided {
            id,
            sender,
            state: settlement.outcome.state(),
        });

        if let Some(contact) = &settlement.contact {
            self.emit(AgentEvent::ContactSaved {
                key: contact.public_key,
            });
            self.refresh_resolvers().await;
        }

        for message in &settlement.outbound {
            self.emit(AgentEvent::Outbound {
                message: message.clone(),
            });
        }

        Ok(Some(settlement))
    }

    fn dismiss(&mut self, id: &Uuid) -> bool {
        let Some(request) = self.registry.remove(id) else {
            return false;
        };

        self.resolvers.remove(&request.sender);
        metrics::PENDING_REQUESTS.set(self.registry.len() as i64);
        info!("Dismissed authorization request {} from {}", id, request.sender);
        self.emit(AgentEvent::RequestRemoved { id: *id });
        true
    }

    fn view(&self, id: &Uuid) -> Option<RequestView> {
        let request = self.registry.get(id)?;
        let resolution = self
            .resolvers
            .get(&request.sender)
            .map(|resolver| resolver.state().clone())
            .unwrap_or(ResolutionState::Invalid);

        Some(RequestView {
            request: request.clone(),
            resolution,
        })
    }

    fn compose(
        &self,
        capabilities: CapabilityFlags,
        greeting: &str,
        attach_extended_key: bool,
    ) -> AuthzResult<OutboundMessage> {
        if self.compose.is_lookup_pending() {
            return Err(AuthzError::Validation(format!(
                "Recipient {} is still being resolved",
                self.compose.current()
            )));
        }

        let own_key = if attach_extended_key {
            Some(self.options.own_extended_key.clone().ok_or_else(|| {
                AuthzError::Validation("No extended key configured".to_string())
            })?)
        } else {
            None
        };

        let message = compose_request(self.compose.state(), capabilities, greeting, own_key)?;
        info!("Composed authorization request to {}", self.compose.current());
        self.emit(AgentEvent::Outbound {
            message: message.clone(),
        });
        Ok(message)
    }

    /// Re-classify every resolver after a contact write
    async fn refresh_resolvers(&mut self) {
        let mut changed = Vec::new();

        match self.compose.refresh(self.contacts.as_ref()).await {
            Ok(Some(state)) => changed.push((
                ResolutionTarget::Compose,
                self.compose.current().to_string(),
                state,
            )),
            Ok(None) => {}
            Err(e) => warn!("Failed to refresh compose resolution: {}", e),
        }

        for (sender, resolver) in self.resolvers.iter_mut() {
            match resolver.refresh(self.contacts.as_ref()).await {
                Ok(Some(state)) => changed.push((
                    ResolutionTarget::Request(*sender),
                    resolver.current().to_string(),
                    state,
                )),
                Ok(None) => {}
                Err(e) => warn!("Failed to refresh resolution for {}: {}", sender, e),
            }
        }

        for (target, identifier, state) in changed {
            self.emit(AgentEvent::ResolutionChanged {
                target,
                identifier,
                state,
            });
        }
    }

    async fn is_blocked(&self, sender: &PublicKey) -> AuthzResult<bool> {
        if self.blocked.contains(sender) {
            return Ok(true);
        }

        Ok(self
            .contacts
            .lookup_by_public_key(sender)
            .await?
            .map(|contact| contact.is_blocked())
            .unwrap_or(false))
    }

    fn emit(&self, event: AgentEvent) {
        debug!("Agent event: {}", event.name());
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{Contact, MemoryContactStore};
    use crate::identity::keys::test_keys::key;
    use crate::identity::Handle;
    use async_trait::async_trait;

    struct NoDirectory;

    #[async_trait]
    impl HandleLookup for NoDirectory {
        async fn lookup_by_handle(&self, _handle: &Handle) -> AuthzResult<Option<PublicKey>> {
            Ok(None)
        }
    }

    /// Directory that never answers
    struct Unanswered;

    #[async_trait]
    impl HandleLookup for Unanswered {
        async fn lookup_by_handle(&self, _handle: &Handle) -> AuthzResult<Option<PublicKey>> {
            std::future::pending().await
        }
    }

    fn start(store: Arc<MemoryContactStore>) -> AgentHandle {
        AuthorizationAgent::spawn(store, Arc::new(NoDirectory), AgentOptions::default())
    }

    #[tokio::test]
    async fn test_deliver_and_list() {
        let handle = start(Arc::new(MemoryContactStore::new()));

        let delivery = handle
            .deliver(AuthorizationMessage::request(&key(1), 0x01))
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Admitted { replaced: None, .. }));

        let group = handle.pending().await.unwrap();
        assert_eq!(group.entries.len(), 1);

        let view = handle.get(group.entries[0].id).await.unwrap().unwrap();
        assert_eq!(view.resolution, ResolutionState::ResolvedKey { key: key(1) });
    }

    #[tokio::test]
    async fn test_blocked_contact_is_suppressed() {
        let mut blocked = Contact::new(key(2));
        blocked.privacy = PrivacySetting::Blocked;
        let handle = start(Arc::new(MemoryContactStore::with_contacts([blocked])));

        let delivery = handle
            .deliver(AuthorizationMessage::request(&key(2), 0x01))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Suppressed);
        assert!(handle.pending().await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_block_decision_suppresses_sender() {
        let handle = start(Arc::new(MemoryContactStore::new()));

        let Delivery::Admitted { request, .. } = handle
            .deliver(AuthorizationMessage::request(&key(3), 0x01))
            .await
            .unwrap()
        else {
            panic!("request not admitted");
        };

        handle
            .decide(request.id, Decision::Block, UserChoices::default())
            .await
            .unwrap()
            .unwrap();

        let again = handle
            .deliver(AuthorizationMessage::request(&key(3), 0x01))
            .await
            .unwrap();
        assert_eq!(again, Delivery::Suppressed);
    }

    #[tokio::test]
    async fn test_malformed_message_rejected() {
        let handle = start(Arc::new(MemoryContactStore::new()));

        let mut message = AuthorizationMessage::request(&key(4), 0x01);
        message.request_param = None;

        let err = handle.deliver(message).await.unwrap_err();
        assert!(matches!(err, AuthzError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_dismiss_emits_removal() {
        let handle = start(Arc::new(MemoryContactStore::new()));
        let mut events = handle.subscribe();

        let Delivery::Admitted { request, .. } = handle
            .deliver(AuthorizationMessage::request(&key(5), 0x01))
            .await
            .unwrap()
        else {
            panic!("request not admitted");
        };

        assert!(handle.dismiss(request.id).await.unwrap());
        assert!(!handle.dismiss(request.id).await.unwrap());

        let mut removed = false;
        while let Ok(event) = events.try_recv() {
            if event == (AgentEvent::RequestRemoved { id: request.id }) {
                removed = true;
            }
        }
        assert!(removed);
    }

    #[tokio::test]
    async fn test_compose_requires_resolution() {
        let handle = start(Arc::new(MemoryContactStore::new()));

        assert!(handle
            .compose(CapabilityFlags::CHAT, "hi", false)
            .await
            .is_err());

        let view = handle.edit_identifier(key(6).to_address()).await.unwrap();
        assert!(view.allows_contact_edit);

        let message = handle
            .compose(CapabilityFlags::CHAT, "hi", false)
            .await
            .unwrap();
        assert!(matches!(message, OutboundMessage::SendRequest { to, .. } if to == key(6)));
    }

    #[tokio::test]
    async fn test_compose_refused_while_recipient_resolves() {
        let handle = AuthorizationAgent::spawn(
            Arc::new(MemoryContactStore::new()),
            Arc::new(Unanswered),
            AgentOptions::default(),
        );

        handle.edit_identifier(key(6).to_address()).await.unwrap();
        let view = handle.edit_identifier("bob").await.unwrap();
        assert_eq!(view.identifier, "bob");
        assert_eq!(view.state, ResolutionState::Invalid);
        assert!(view.lookup_pending);
        assert!(!view.allows_contact_edit);

        let err = handle
            .compose(CapabilityFlags::CHAT, "hi", false)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
    }

    #[tokio::test]
    async fn test_restore_skips_blocked() {
        let mut blocked = Contact::new(key(8));
        blocked.privacy = PrivacySetting::Blocked;
        let store = Arc::new(MemoryContactStore::with_contacts([blocked]));
        let (mut agent, handle) =
            AuthorizationAgent::new(store, Arc::new(NoDirectory), AgentOptions::default());

        let stored = vec![
            AuthorizationMessage::request(&key(7), 0x01),
            AuthorizationMessage::request(&key(8), 0x01),
        ];
        assert_eq!(agent.restore(&stored).await.unwrap(), 1);

        tokio::spawn(agent.run());
        let group = handle.pending().await.unwrap();
        assert_eq!(group.entries.len(), 1);
        assert_eq!(group.entries[0].sender, key(7));
    }
}
