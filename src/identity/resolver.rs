//! Identity Resolver - classifies identifiers and correlates handle lookups
//!
//! The resolver is owned by a single task. Classification of key addresses
//! happens inline; handle lookups are handed back to the owner as a
//! [`LookupTicket`] so they can run elsewhere, and their results are applied
//! with [`IdentityResolver::complete_lookup`]. A result is only applied while
//! its identifier is still the current input.
use crate::{
    contacts::ContactStore,
    error::AuthzResult,
    identity::{Handle, PublicKey, ResolutionState},
};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default window during which a repeated lookup is suppressed
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

const NOTIFY_CAPACITY: usize = 16;

/// Whether the resolver backs an editable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    Editable,
    ReadOnly,
}

/// Pending handle lookup, correlated by identifier value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub identifier: String,
    pub handle: Handle,
}

/// Result of feeding an identifier to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStep {
    /// Classified without a lookup
    Settled(ResolutionState),
    /// A handle lookup must be run and reported back
    Lookup(LookupTicket),
    /// Same identifier looked up too recently; state unchanged
    Suppressed,
}

pub struct IdentityResolver {
    mode: ResolverMode,
    current: String,
    state: ResolutionState,
    /// Key the identifier must resolve to (request display)
    bound_key: Option<PublicKey>,
    /// Handle behind the current key, once a lookup confirmed it
    confirmed_handle: Option<Handle>,
    in_flight: Option<String>,
    last_completed: Option<(String, Instant)>,
    debounce: Duration,
    notifier: broadcast::Sender<ResolutionState>,
}

impl IdentityResolver {
    /// Create a resolver for a free-form identifier field
    pub fn new(mode: ResolverMode, debounce: Duration) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            mode,
            current: String::new(),
            state: ResolutionState::Invalid,
            bound_key: None,
            confirmed_handle: None,
            in_flight: None,
            last_completed: None,
            debounce,
            notifier,
        }
    }

    /// Read-only resolver for a request from `sender`
    ///
    /// The sender key is classified directly; a claimed handle only upgrades
    /// the state when the directory binds it to the same key.
    pub fn for_sender(sender: PublicKey, debounce: Duration) -> Self {
        let mut resolver = Self::new(ResolverMode::ReadOnly, debounce);
        resolver.bound_key = Some(sender);
        resolver
    }

    pub fn mode(&self) -> ResolverMode {
        self.mode
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    pub fn is_lookup_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Subscribe to state changes (one message per completed resolution)
    pub fn subscribe(&self) -> broadcast::Receiver<ResolutionState> {
        self.notifier.subscribe()
    }

    /// Whether the current state may be used to add or edit a contact
    pub fn allows_contact_edit(&self) -> bool {
        self.mode == ResolverMode::Editable
            && matches!(
                self.state,
                ResolutionState::ResolvedHandle { .. } | ResolutionState::ResolvedKey { .. }
            )
    }

    /// Classify `identifier`
    pub async fn resolve(
        &mut self,
        identifier: &str,
        contacts: &dyn ContactStore,
    ) -> AuthzResult<ResolveStep> {
        let identifier = identifier.trim();
        let changed = identifier != self.current;

        if changed {
            self.current = identifier.to_string();
            self.in_flight = None;
            self.confirmed_handle = None;
        }

        if let Ok(key) = PublicKey::parse(identifier) {
            let state = match self.bound_key {
                Some(bound) if bound != key => ResolutionState::Invalid,
                _ => self.classify_key(key, contacts).await?,
            };
            return Ok(ResolveStep::Settled(self.publish(state)));
        }

        let handle = match Handle::parse(identifier) {
            Ok(handle) => handle,
            Err(_) => {
                let state = match self.bound_key {
                    Some(bound) => self.classify_key(bound, contacts).await?,
                    None => ResolutionState::Invalid,
                };
                return Ok(ResolveStep::Settled(self.publish(state)));
            }
        };

        // A changed identifier always gets a fresh lookup
        if !changed && self.should_suppress(identifier) {
            debug!("Suppressing repeated lookup for {}", identifier);
            return Ok(ResolveStep::Suppressed);
        }

        // Provisional until the lookup completes, so not published. Bound
        // resolvers stay actionable on the key while the handle is checked.
        if changed {
            self.state = match self.bound_key {
                Some(bound) => self.classify_key(bound, contacts).await?,
                None => ResolutionState::Invalid,
            };
        }

        self.in_flight = Some(identifier.to_string());
        Ok(ResolveStep::Lookup(LookupTicket {
            identifier: identifier.to_string(),
            handle,
        }))
    }

    /// Apply a finished lookup
    ///
    /// Returns `None` when the ticket no longer matches the current input.
    pub async fn complete_lookup(
        &mut self,
        ticket: LookupTicket,
        result: AuthzResult<Option<PublicKey>>,
        contacts: &dyn ContactStore,
    ) -> AuthzResult<Option<ResolutionState>> {
        if ticket.identifier != self.current {
            debug!(
                "Discarding stale lookup for {} (current input {:?})",
                ticket.identifier, self.current
            );
            return Ok(None);
        }

        if self.in_flight.as_deref() == Some(ticket.identifier.as_str()) {
            self.in_flight = None;
        }

        let found = match result {
            Ok(found) => {
                self.last_completed = Some((ticket.identifier.clone(), Instant::now()));
                found
            }
            Err(e) => {
                // Not recorded for debounce so the next edit retries
                warn!("Lookup for {} failed: {}", ticket.identifier, e);
                None
            }
        };

        let state = match (found, self.bound_key) {
            (Some(key), Some(bound)) if key == bound => {
                self.confirmed_handle = Some(ticket.handle.clone());
                self.classify_handle(ticket.handle, key, contacts).await?
            }
            (Some(key), Some(bound)) => {
                warn!(
                    "Handle {} is bound to {}, not to sender {}",
                    ticket.handle, key, bound
                );
                self.classify_key(bound, contacts).await?
            }
            (None, Some(bound)) => self.classify_key(bound, contacts).await?,
            (Some(key), None) => {
                self.confirmed_handle = Some(ticket.handle.clone());
                self.classify_handle(ticket.handle, key, contacts).await?
            }
            (None, None) => ResolutionState::Invalid,
        };

        Ok(Some(self.publish(state)))
    }

    /// Re-classify the resolved key after the contact store changed
    ///
    /// Returns the new state if it differs from the current one.
    pub async fn refresh(
        &mut self,
        contacts: &dyn ContactStore,
    ) -> AuthzResult<Option<ResolutionState>> {
        let Some(key) = self.state.key().copied() else {
            return Ok(None);
        };

        let state = match self.confirmed_handle.clone() {
            Some(handle) => self.classify_handle(handle, key, contacts).await?,
            None => self.classify_key(key, contacts).await?,
        };

        if state == self.state {
            return Ok(None);
        }

        Ok(Some(self.publish(state)))
    }

    fn should_suppress(&self, identifier: &str) -> bool {
        if self.in_flight.as_deref() == Some(identifier) {
            return true;
        }

        match &self.last_completed {
            Some((last, at)) => last == identifier && at.elapsed() < self.debounce,
            None => false,
        }
    }

    async fn classify_key(
        &self,
        key: PublicKey,
        contacts: &dyn ContactStore,
    ) -> AuthzResult<ResolutionState> {
        if contacts.lookup_by_public_key(&key).await?.is_some() {
            Ok(ResolutionState::AlreadyContact { key })
        } else {
            Ok(ResolutionState::ResolvedKey { key })
        }
    }

    async fn classify_handle(
        &self,
        handle: Handle,
        key: PublicKey,
        contacts: &dyn ContactStore,
    ) -> AuthzResult<ResolutionState> {
        if contacts.lookup_by_public_key(&key).await?.is_some() {
            Ok(ResolutionState::AlreadyContact { key })
        } else {
            Ok(ResolutionState::ResolvedHandle { handle, key })
        }
    }

    fn publish(&mut self, state: ResolutionState) -> ResolutionState {
        self.state = state.clone();
        // No subscribers is fine
        let _ = self.notifier.send(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{Contact, MemoryContactStore};
    use crate::error::AuthzError;
    use crate::identity::keys::test_keys::key;

    fn editable() -> IdentityResolver {
        IdentityResolver::new(ResolverMode::Editable, DEFAULT_DEBOUNCE)
    }

    fn ticket(step: ResolveStep) -> LookupTicket {
        match step {
            ResolveStep::Lookup(ticket) => ticket,
            other => panic!("expected lookup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raw_key_resolves_directly() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let step = resolver.resolve(&key(1).to_address(), &contacts).await.unwrap();
        assert_eq!(
            step,
            ResolveStep::Settled(ResolutionState::ResolvedKey { key: key(1) })
        );
        assert!(resolver.allows_contact_edit());
    }

    #[tokio::test]
    async fn test_raw_key_of_contact_is_already_contact() {
        let contacts = MemoryContactStore::with_contacts([Contact::new(key(2))]);
        let mut resolver = editable();

        let step = resolver.resolve(&key(2).to_address(), &contacts).await.unwrap();
        assert_eq!(
            step,
            ResolveStep::Settled(ResolutionState::AlreadyContact { key: key(2) })
        );
        assert!(!resolver.allows_contact_edit());
    }

    #[tokio::test]
    async fn test_garbage_is_invalid() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let step = resolver.resolve("not a handle!", &contacts).await.unwrap();
        assert_eq!(step, ResolveStep::Settled(ResolutionState::Invalid));
    }

    #[tokio::test]
    async fn test_handle_lookup_resolves() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();
        let mut events = resolver.subscribe();

        let t = ticket(resolver.resolve("alice", &contacts).await.unwrap());
        assert!(resolver.is_lookup_pending());

        let state = resolver
            .complete_lookup(t, Ok(Some(key(3))), &contacts)
            .await
            .unwrap();

        let expected = ResolutionState::ResolvedHandle {
            handle: Handle::parse("alice").unwrap(),
            key: key(3),
        };
        assert_eq!(state, Some(expected.clone()));
        assert_eq!(events.try_recv().unwrap(), expected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_handle_is_invalid() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let t = ticket(resolver.resolve("ghost", &contacts).await.unwrap());
        let state = resolver.complete_lookup(t, Ok(None), &contacts).await.unwrap();
        assert_eq!(state, Some(ResolutionState::Invalid));
    }

    #[tokio::test]
    async fn test_stale_lookup_is_discarded() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let bob = ticket(resolver.resolve("bob", &contacts).await.unwrap());
        let carol = ticket(resolver.resolve("carol", &contacts).await.unwrap());

        // carol finishes first, then bob's late answer arrives
        resolver
            .complete_lookup(carol, Ok(Some(key(5))), &contacts)
            .await
            .unwrap();
        let stale = resolver
            .complete_lookup(bob, Ok(Some(key(4))), &contacts)
            .await
            .unwrap();

        assert_eq!(stale, None);
        assert_eq!(resolver.state().key(), Some(&key(5)));
        assert_eq!(resolver.current(), "carol");
    }

    #[tokio::test]
    async fn test_pending_handle_drops_previous_state() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();
        let mut events = resolver.subscribe();

        resolver.resolve(&key(6).to_address(), &contacts).await.unwrap();
        assert!(resolver.allows_contact_edit());
        assert_eq!(
            events.try_recv().unwrap(),
            ResolutionState::ResolvedKey { key: key(6) }
        );

        let t = ticket(resolver.resolve("bob", &contacts).await.unwrap());
        assert_eq!(resolver.state(), &ResolutionState::Invalid);
        assert!(resolver.is_lookup_pending());
        assert!(!resolver.allows_contact_edit());
        // Nothing published until the lookup answers
        assert!(events.try_recv().is_err());

        resolver
            .complete_lookup(t, Ok(Some(key(3))), &contacts)
            .await
            .unwrap();
        assert_eq!(events.try_recv().unwrap().key(), Some(&key(3)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_lookup_is_debounced() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let t = ticket(resolver.resolve("dave", &contacts).await.unwrap());

        // In flight
        assert_eq!(
            resolver.resolve("dave", &contacts).await.unwrap(),
            ResolveStep::Suppressed
        );

        resolver
            .complete_lookup(t, Ok(Some(key(6))), &contacts)
            .await
            .unwrap();

        // Completed moments ago
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(
            resolver.resolve("dave", &contacts).await.unwrap(),
            ResolveStep::Suppressed
        );

        // Window elapsed
        tokio::time::advance(DEFAULT_DEBOUNCE).await;
        assert!(matches!(
            resolver.resolve("dave", &contacts).await.unwrap(),
            ResolveStep::Lookup(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_identifier_always_looks_up() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let t = ticket(resolver.resolve("erin", &contacts).await.unwrap());
        resolver.complete_lookup(t, Ok(None), &contacts).await.unwrap();

        assert!(matches!(
            resolver.resolve("erin2", &contacts).await.unwrap(),
            ResolveStep::Lookup(_)
        ));
        // And back again: different from the current input, so not suppressed
        assert!(matches!(
            resolver.resolve("erin", &contacts).await.unwrap(),
            ResolveStep::Lookup(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_debounced() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let t = ticket(resolver.resolve("frank", &contacts).await.unwrap());
        let state = resolver
            .complete_lookup(t, Err(AuthzError::Lookup("timeout".to_string())), &contacts)
            .await
            .unwrap();
        assert_eq!(state, Some(ResolutionState::Invalid));

        assert!(matches!(
            resolver.resolve("frank", &contacts).await.unwrap(),
            ResolveStep::Lookup(_)
        ));
    }

    #[tokio::test]
    async fn test_bound_resolver_upgrades_on_matching_handle() {
        let contacts = MemoryContactStore::new();
        let mut resolver = IdentityResolver::for_sender(key(7), DEFAULT_DEBOUNCE);
        assert_eq!(resolver.mode(), ResolverMode::ReadOnly);

        let mut events = resolver.subscribe();

        let t = ticket(resolver.resolve("grace", &contacts).await.unwrap());
        // Key classification is available while the handle is checked
        assert_eq!(resolver.state(), &ResolutionState::ResolvedKey { key: key(7) });
        assert!(events.try_recv().is_err());

        let state = resolver
            .complete_lookup(t, Ok(Some(key(7))), &contacts)
            .await
            .unwrap();
        assert!(matches!(state, Some(ResolutionState::ResolvedHandle { .. })));
        assert!(!resolver.allows_contact_edit());

        // One notification for the whole resolution
        assert_eq!(Some(events.try_recv().unwrap()), state);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bound_resolver_ignores_foreign_handle() {
        let contacts = MemoryContactStore::new();
        let mut resolver = IdentityResolver::for_sender(key(8), DEFAULT_DEBOUNCE);

        let t = ticket(resolver.resolve("mallory", &contacts).await.unwrap());
        let state = resolver
            .complete_lookup(t, Ok(Some(key(9))), &contacts)
            .await
            .unwrap();

        assert_eq!(state, Some(ResolutionState::ResolvedKey { key: key(8) }));
    }

    #[tokio::test]
    async fn test_bound_resolver_without_handle_uses_key() {
        let contacts = MemoryContactStore::with_contacts([Contact::new(key(10))]);
        let mut resolver = IdentityResolver::for_sender(key(10), DEFAULT_DEBOUNCE);

        let step = resolver.resolve("", &contacts).await.unwrap();
        assert_eq!(
            step,
            ResolveStep::Settled(ResolutionState::AlreadyContact { key: key(10) })
        );
    }

    #[tokio::test]
    async fn test_refresh_after_contact_created() {
        let contacts = MemoryContactStore::new();
        let mut resolver = editable();

        let t = ticket(resolver.resolve("heidi", &contacts).await.unwrap());
        resolver
            .complete_lookup(t, Ok(Some(key(11))), &contacts)
            .await
            .unwrap();

        contacts.upsert(&Contact::new(key(11))).await.unwrap();

        let refreshed = resolver.refresh(&contacts).await.unwrap();
        assert_eq!(refreshed, Some(ResolutionState::AlreadyContact { key: key(11) }));

        // Nothing changed since
        assert_eq!(resolver.refresh(&contacts).await.unwrap(), None);
    }
}
