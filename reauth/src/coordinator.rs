use std::{fmt, sync::Arc};

use reauth_clock::{Clock, System};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    backoff::{Retry, RetryHandler, RetryPolicy},
    providers::{LoginProvider, ProviderError},
    store::CredentialStore,
    validity::ValidityPolicy,
    Credential, IdentityRef, ProviderId, SessionTicket,
};

/// A fatal failure to obtain a usable credential
#[derive(Debug, Error)]
pub enum ReauthError {
    /// The identity provider needs a manual sign-in step; retrying cannot help
    #[error("identity provider requires an interactive sign-in step")]
    InteractiveStepRequired {
        /// The provider's error
        #[source]
        source: ProviderError,
    },
    /// Every permitted refresh attempt failed
    #[error("error refreshing access token after {attempts} attempts")]
    RefreshExhausted {
        /// The number of attempts made
        attempts: u32,
    },
}

struct Held<P> {
    provider: P,
    credential: Option<Credential>,
}

/// Serializes every credential read, refresh and ticket installation behind
/// a single gate
///
/// The gate is held for the whole of a request, including provider calls
/// and the sleeps between retries, so at most one refresh is ever in flight
/// and no caller observes a credential mid-update. A slow refresh therefore
/// blocks every other caller of the same coordinator until it finishes.
///
/// Share one coordinator per process (behind an [`Arc`]) to make the gate
/// process-wide.
pub struct ReauthCoordinator<P, C = System> {
    gate: Mutex<Held<P>>,
    store: Arc<dyn CredentialStore>,
    validity: ValidityPolicy,
    retry: RetryPolicy,
    clock: C,
}

impl<P: LoginProvider> ReauthCoordinator<P, System> {
    /// Constructs a coordinator that obtains credentials from `provider` and
    /// caches them in `store`
    pub fn new(provider: P, store: impl CredentialStore + 'static) -> Self {
        Self {
            gate: Mutex::new(Held {
                provider,
                credential: None,
            }),
            store: Arc::new(store),
            validity: ValidityPolicy::default(),
            retry: RetryPolicy::default(),
            clock: System,
        }
    }
}

impl<P, C> ReauthCoordinator<P, C> {
    /// Sets the policy used to judge whether a held credential is usable
    pub fn with_validity_policy(mut self, validity: ValidityPolicy) -> Self {
        self.validity = validity;
        self
    }

    /// Sets the retry policy for the refresh loop
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seeds the coordinator with a credential obtained elsewhere
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.gate.get_mut().credential = Some(credential);
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> ReauthCoordinator<P, D> {
        ReauthCoordinator {
            gate: self.gate,
            store: self.store,
            validity: self.validity,
            retry: self.retry,
            clock,
        }
    }

    /// The clock used to judge expiry
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Overwrites the session ticket of the held credential
    ///
    /// Does nothing if no credential is held. Returns whether the ticket was
    /// installed.
    pub async fn install_session_ticket(&self, ticket: SessionTicket) -> bool {
        let mut held = self.gate.lock().await;
        match held.credential.as_mut() {
            Some(credential) => {
                tracing::debug!(
                    identity = %credential.identity(),
                    expire_timestamp_ms = ticket.expire_timestamp_ms().as_millis(),
                    "installing session ticket"
                );
                credential.set_session_ticket(Some(ticket));
                true
            }
            None => {
                tracing::debug!("no credential held, dropping session ticket");
                false
            }
        }
    }

    /// A copy of the currently held credential, without any validity checks
    pub async fn current(&self) -> Option<Credential> {
        self.gate.lock().await.credential.clone()
    }
}

impl<P: LoginProvider, C: Clock + Send + Sync> ReauthCoordinator<P, C> {
    /// Returns a usable credential, refreshing it if needed
    ///
    /// With `force_refresh`, the held credential is expired first (and its
    /// cache record removed when `use_cache` is set). A held credential that
    /// is still usable is returned without any I/O. Otherwise an unexpired
    /// cached record is adopted, and failing that the provider is asked for
    /// a fresh credential, retrying with backoff.
    pub async fn get_valid_credential(
        &self,
        force_refresh: bool,
        use_cache: bool,
    ) -> Result<Credential, ReauthError> {
        let mut guard = self.gate.lock().await;
        let held = &mut *guard;

        if force_refresh {
            tracing::debug!("forcing credential refresh");
            if let Some(credential) = held.credential.as_mut() {
                credential.expire_at(self.clock.now());
            }
            if use_cache {
                self.delete_cached(held).await;
            }
        }

        if let Some(credential) = held.credential.as_mut() {
            if self.validity.is_usable(credential, &self.clock) {
                tracing::trace!("held credential is usable");
                return Ok(credential.clone());
            }
        }

        if use_cache {
            let identity = held.provider.identity();
            let provider = held.provider.provider_id();
            if let Some(cached) = self.store.load(identity, provider).await {
                tracing::debug!(
                    store = self.store.name(),
                    %identity,
                    %provider,
                    "adopting cached credential"
                );
                held.credential = Some(cached.clone());
                return Ok(cached);
            }
            tracing::debug!(store = self.store.name(), %identity, %provider, "no usable cached credential");
        }

        self.refresh(held, use_cache).await
    }

    async fn refresh(&self, held: &mut Held<P>, use_cache: bool) -> Result<Credential, ReauthError> {
        let mut retry = RetryHandler::new(self.retry);

        loop {
            if let Some(credential) = self.fresh(held) {
                return Ok(credential);
            }

            // A refresh always invalidates the on-disk copy first.
            if use_cache {
                self.delete_cached(held).await;
            }

            tracing::debug!(
                attempt = retry.failures() + 1,
                provider = %held.provider.provider_id(),
                "requesting new credential"
            );
            match held.provider.obtain_credential().await {
                Ok(credential) => held.credential = Some(credential),
                Err(error) if !error.is_retryable() => {
                    tracing::error!(
                        error = (&error as &dyn std::error::Error),
                        "identity provider requires an interactive sign-in step, giving up"
                    );
                    return Err(ReauthError::InteractiveStepRequired { source: error });
                }
                Err(error) => {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        "error requesting credential"
                    );
                }
            }

            if let Some(credential) = self.fresh(held) {
                if use_cache {
                    if let Err(error) = self.store.save(&credential).await {
                        tracing::warn!(
                            store = self.store.name(),
                            error = (&error as &dyn std::error::Error),
                            "unable to persist refreshed credential"
                        );
                    }
                }
                tracing::info!(
                    identity = %credential.identity(),
                    provider = %credential.provider(),
                    attempts = retry.failures() + 1,
                    "credential refreshed"
                );
                return Ok(credential);
            }

            match retry.failure() {
                Retry::After(delay) => {
                    tracing::warn!(
                        failures = retry.failures(),
                        delay_secs = delay.as_secs(),
                        "credential refresh failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Retry::Exhausted(delay) => {
                    tracing::error!(
                        attempts = retry.failures(),
                        delay_secs = delay.as_secs(),
                        "credential refresh exhausted"
                    );
                    tokio::time::sleep(delay).await;
                    return Err(ReauthError::RefreshExhausted {
                        attempts: retry.failures(),
                    });
                }
            }
        }
    }

    /// The held credential, if it has a non-empty, unexpired token
    fn fresh(&self, held: &Held<P>) -> Option<Credential> {
        held.credential
            .as_ref()
            .filter(|c| !c.needs_login_at(self.clock.now()))
            .cloned()
    }

    async fn delete_cached(&self, held: &Held<P>) {
        let (identity, provider): (&IdentityRef, ProviderId) = match held.credential.as_ref() {
            Some(credential) => (credential.identity(), credential.provider()),
            None => (held.provider.identity(), held.provider.provider_id()),
        };

        if let Err(error) = self.store.delete(identity, provider).await {
            tracing::warn!(
                store = self.store.name(),
                %identity,
                error = (&error as &dyn std::error::Error),
                "unable to remove cached credential"
            );
        }
    }
}

impl<P, C> fmt::Debug for ReauthCoordinator<P, C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReauthCoordinator")
            .field("store", &self.store.name())
            .field("validity", &self.validity)
            .field("retry", &self.retry)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
