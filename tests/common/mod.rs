//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use contact_trust::{
    agent::AgentEvent,
    error::AuthzResult,
    identity::{ExtendedPublicKey, Handle, HandleLookup, PublicKey},
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::{broadcast, Notify};
use tokio::time::{timeout, Duration};

/// Deterministic key from a small scalar
pub fn key(seed: u8) -> PublicKey {
    let mut scalar = [0u8; 32];
    scalar[31] = seed.max(1);
    let secret = k256::SecretKey::from_slice(&scalar).unwrap();
    let point = secret.public_key().to_encoded_point(true);
    PublicKey::from_bytes(point.as_bytes()).unwrap()
}

pub fn extended(seed: u8) -> ExtendedPublicKey {
    ExtendedPublicKey::new(key(seed), [seed; 32])
}

/// Handle lookup answering from a fixed table
///
/// A gated handle holds its answer until the gate is opened.
#[derive(Default)]
pub struct ScriptedLookup {
    bindings: Mutex<HashMap<String, PublicKey>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: AtomicUsize,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(self, handle: &str, key: PublicKey) -> Self {
        self.bindings
            .lock()
            .unwrap()
            .insert(handle.to_string(), key);
        self
    }

    /// Hold lookups of `handle` until the returned gate is notified
    pub fn gate(&self, handle: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(handle.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandleLookup for ScriptedLookup {
    async fn lookup_by_handle(&self, handle: &Handle) -> AuthzResult<Option<PublicKey>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().get(handle.as_str()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        Ok(self.bindings.lock().unwrap().get(handle.as_str()).copied())
    }
}

/// Wait for the first event matching `pred`
pub async fn wait_for<F>(events: &mut broadcast::Receiver<AgentEvent>, mut pred: F) -> AgentEvent
where
    F: FnMut(&AgentEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for agent event")
}

/// Assert no event matching `pred` arrives within `window`
pub async fn assert_no_event<F>(
    events: &mut broadcast::Receiver<AgentEvent>,
    window: Duration,
    mut pred: F,
) where
    F: FnMut(&AgentEvent) -> bool,
{
    let found = timeout(window, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await;

    if let Ok(event) = found {
        panic!("unexpected event {:?}", event);
    }
}
