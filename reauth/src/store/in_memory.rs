//! An in-memory credential store

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use reauth_clock::{Clock, System};

use super::{is_persistable, CredentialStore, StoreError};
use crate::{Credential, Identity, IdentityRef, ProviderId};

type Records = HashMap<(Identity, ProviderId), Credential>;

/// An in-memory credential store
///
/// Applies the same admission and expiry rules as the file store, without
/// touching the filesystem.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore<C = System> {
    records: Mutex<Records>,
    clock: C,
}

impl InMemoryCredentialStore<System> {
    /// Constructs a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C> InMemoryCredentialStore<C> {
    /// Sets a custom clock to be used when judging expiry
    pub fn with_clock<D>(self, clock: D) -> InMemoryCredentialStore<D> {
        InMemoryCredentialStore {
            records: self.records,
            clock,
        }
    }

    /// Whether a record exists for the key, regardless of expiry
    pub fn contains(&self, identity: &IdentityRef, provider: ProviderId) -> bool {
        self.records()
            .contains_key(&(identity.to_owned(), provider))
    }

    /// Inserts a record verbatim, bypassing the admission rules
    ///
    /// Lets tests plant stale records.
    pub fn insert_unchecked(&self, credential: Credential) {
        let key = (credential.identity().to_owned(), credential.provider());
        self.records().insert(key, credential);
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        // A panic while holding the lock cannot leave a map half-updated.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialStore for InMemoryCredentialStore<C> {
    async fn load(&self, identity: &IdentityRef, provider: ProviderId) -> Option<Credential> {
        let credential = self
            .records()
            .get(&(identity.to_owned(), provider))
            .cloned()?;

        if credential.needs_login_at(self.clock.now()) {
            None
        } else {
            Some(credential)
        }
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if is_persistable(credential, self.clock.now()) {
            let mut stored = credential.clone();
            stored.set_session_ticket(None);
            self.insert_unchecked(stored);
        }
        Ok(())
    }

    async fn delete(&self, identity: &IdentityRef, provider: ProviderId) -> Result<(), StoreError> {
        self.records().remove(&(identity.to_owned(), provider));
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
