//! Local persistence of credentials

use async_trait::async_trait;
use std::io;
use thiserror::Error;

use crate::{Credential, IdentityRef, ProviderId};

#[cfg(feature = "file")]
pub mod file;
pub mod in_memory;

#[cfg(feature = "file")]
pub use file::FileCredentialStore;
pub use in_memory::InMemoryCredentialStore;

/// An error while writing to or removing from a credential store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record could not be written or removed
    #[error("credential record I/O failed")]
    Io(#[from] io::Error),
    /// The credential could not be serialized
    #[error("credential record could not be serialized")]
    Serialization(#[from] serde_json::Error),
}

/// A keyed record of credentials, one per `(identity, provider)`
///
/// Stores never hand back garbage: a record that is missing, unreadable,
/// malformed or already expired loads as `None`, and credentials without an
/// identity, without a token, or with an expired token are silently not
/// saved.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the record for the given key, if present and still valid
    async fn load(&self, identity: &IdentityRef, provider: ProviderId) -> Option<Credential>;

    /// Persists a credential, replacing any previous record for its key
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Removes the record for the given key if it exists
    async fn delete(&self, identity: &IdentityRef, provider: ProviderId) -> Result<(), StoreError>;

    /// Name of this store, for diagnostics
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn load(&self, identity: &IdentityRef, provider: ProviderId) -> Option<Credential> {
        (**self).load(identity, provider).await
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        (**self).save(credential).await
    }

    async fn delete(&self, identity: &IdentityRef, provider: ProviderId) -> Result<(), StoreError> {
        (**self).delete(identity, provider).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Whether a credential is fit to be written to a store as of `now`
pub(crate) fn is_persistable(credential: &Credential, now: reauth_clock::UnixMillis) -> bool {
    !credential.identity().as_str().is_empty() && !credential.needs_login_at(now)
}
