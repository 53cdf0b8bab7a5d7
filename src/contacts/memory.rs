//! In-memory contact store
use crate::{
    contacts::{Contact, ContactStore},
    error::{AuthzError, AuthzResult},
    identity::PublicKey,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Contact store held in process memory
///
/// Writes can be switched off to exercise store-failure paths.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: RwLock<HashMap<PublicKey, Contact>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing contacts
    pub fn with_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let map = contacts
            .into_iter()
            .map(|c| (c.public_key, c))
            .collect::<HashMap<_, _>>();

        Self {
            contacts: RwLock::new(map),
            ..Self::default()
        }
    }

    /// Make every subsequent upsert fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contacts.read().await.is_empty()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn lookup_by_public_key(&self, key: &PublicKey) -> AuthzResult<Option<Contact>> {
        Ok(self.contacts.read().await.get(key).cloned())
    }

    async fn upsert(&self, contact: &Contact) -> AuthzResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthzError::StoreWriteFailure(
                "contact store is read-only".to_string(),
            ));
        }

        self.contacts
            .write()
            .await
            .insert(contact.public_key, contact.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keys::test_keys::key;

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = MemoryContactStore::new();

        let mut contact = Contact::new(key(1));
        contact.first_name = "Alice".to_string();
        store.upsert(&contact).await.unwrap();

        contact.first_name = "Alicia".to_string();
        store.upsert(&contact).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.lookup_by_public_key(&key(1)).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Alicia");
    }

    #[tokio::test]
    async fn test_failing_writes_leave_store_untouched() {
        let store = MemoryContactStore::new();
        store.set_fail_writes(true);

        let result = store.upsert(&Contact::new(key(2))).await;
        assert!(matches!(result, Err(AuthzError::StoreWriteFailure(_))));
        assert!(store.is_empty().await);
        assert_eq!(store.write_count(), 0);
    }
}
