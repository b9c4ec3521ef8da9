use std::{error, future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use reauth_clock::{Clock, System, UnixMillis};

use crate::{
    coordinator::{ReauthCoordinator, ReauthError},
    providers::LoginProvider,
    Credential, SessionTicket,
};

/// A background task that never needs to be awaited
pub type BackgroundTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The remote-service operations run while starting a session
///
/// Implementations typically obtain credentials through a clone of the
/// session's [`ReauthCoordinator`].
#[async_trait]
pub trait RemoteSession: Send {
    /// The error returned by any remote operation
    type Error: error::Error + Send + Sync + 'static;

    /// The initial player state returned from bootstrapping
    type PlayerState: Send;

    /// Produces the liveness watcher to run in the background
    fn liveness_watcher(&self) -> BackgroundTask;

    /// Constructs the outbound request builder for a session started at `started_at`
    fn build_requests(&mut self, started_at: UnixMillis) -> Result<(), Self::Error>;

    /// Fetches the player state
    ///
    /// The first fetch of a session is made without the common requests that
    /// later fetches piggyback.
    async fn get_player(&mut self, with_common_requests: bool) -> Result<Self::PlayerState, Self::Error>;

    /// Fetches the remote configuration version
    async fn get_remote_config_version(&mut self) -> Result<(), Self::Error>;

    /// Fetches the asset digest
    async fn get_asset_digest(&mut self) -> Result<(), Self::Error>;

    /// Fetches the item templates
    async fn get_item_templates(&mut self) -> Result<(), Self::Error>;

    /// Fetches the full player profile
    async fn get_player_profile(&mut self) -> Result<(), Self::Error>;
}

/// The entry point for obtaining credentials and starting a session
#[derive(Debug)]
pub struct Session<R, P, C = System> {
    coordinator: Arc<ReauthCoordinator<P, C>>,
    remote: R,
    started_at: Option<UnixMillis>,
}

impl<R, P, C> Session<R, P, C> {
    /// Constructs a session over a shared coordinator and the remote operations
    pub fn new(coordinator: Arc<ReauthCoordinator<P, C>>, remote: R) -> Self {
        Self {
            coordinator,
            remote,
            started_at: None,
        }
    }

    /// The shared coordinator
    pub fn coordinator(&self) -> &Arc<ReauthCoordinator<P, C>> {
        &self.coordinator
    }

    /// The remote operations
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// When [`bootstrap`][Self::bootstrap] began, if it has run
    pub fn started_at(&self) -> Option<UnixMillis> {
        self.started_at
    }

    /// Pushes a freshly issued session ticket onto the held credential
    pub async fn install_session_ticket(&self, ticket: SessionTicket) -> bool {
        self.coordinator.install_session_ticket(ticket).await
    }
}

impl<R, P, C> Session<R, P, C>
where
    P: LoginProvider,
    C: Clock + Send + Sync,
{
    /// Returns a usable credential, refreshing it if needed
    pub async fn get_valid_credential(
        &self,
        force_refresh: bool,
        use_cache: bool,
    ) -> Result<Credential, ReauthError> {
        self.coordinator
            .get_valid_credential(force_refresh, use_cache)
            .await
    }
}

impl<R, P, C> Session<R, P, C>
where
    R: RemoteSession,
    C: Clock,
{
    /// Runs the startup sequence and returns the initial player state
    ///
    /// The liveness watcher is spawned and left running. The remaining steps
    /// run in order and the first failure is returned as-is; none of them
    /// are retried here.
    pub async fn bootstrap(&mut self) -> Result<R::PlayerState, R::Error> {
        tokio::spawn(self.remote.liveness_watcher());

        let started_at = self.coordinator.clock().now();
        self.started_at = Some(started_at);
        tracing::debug!(started_at = started_at.as_millis(), "starting session");

        self.remote.build_requests(started_at)?;

        let player = self.remote.get_player(false).await?;

        self.remote.get_remote_config_version().await?;
        self.remote.get_asset_digest().await?;
        self.remote.get_item_templates().await?;

        self.remote.get_player_profile().await?;

        tracing::info!("session started");
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use color_eyre::Result;
    use reauth_clock::TestClock;
    use thiserror::Error;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{
        providers::ProviderError, store::InMemoryCredentialStore, AccessToken, Identity,
        IdentityRef, ProviderId,
    };

    const NOW: UnixMillis = UnixMillis(1_700_000_000_000);

    struct FixedProvider(Identity);

    #[async_trait]
    impl LoginProvider for FixedProvider {
        fn identity(&self) -> &IdentityRef {
            &self.0
        }

        fn provider_id(&self) -> ProviderId {
            ProviderId::Google
        }

        async fn obtain_credential(&mut self) -> Result<Credential, ProviderError> {
            Ok(Credential::new(
                self.0.clone(),
                ProviderId::Google,
                Some(AccessToken::from_static("token")),
                None,
            ))
        }
    }

    #[derive(Debug, Error)]
    #[error("remote call {0} failed")]
    struct RemoteError(&'static str);

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeRemote {
        recorder: Arc<Recorder>,
        fail_on: Option<&'static str>,
        watcher_started: StdMutex<Option<oneshot::Sender<()>>>,
        coordinator: Arc<ReauthCoordinator<FixedProvider, TestClock>>,
    }

    impl FakeRemote {
        fn step(&self, name: &'static str) -> Result<(), RemoteError> {
            self.recorder.push(name);
            if self.fail_on == Some(name) {
                Err(RemoteError(name))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteSession for FakeRemote {
        type Error = RemoteError;
        type PlayerState = &'static str;

        fn liveness_watcher(&self) -> BackgroundTask {
            let started = self.watcher_started.lock().unwrap().take();
            Box::pin(async move {
                if let Some(started) = started {
                    let _ = started.send(());
                }
                std::future::pending::<()>().await
            })
        }

        fn build_requests(&mut self, started_at: UnixMillis) -> Result<(), Self::Error> {
            self.recorder.push(format!("build_requests@{}", started_at.as_millis()));
            Ok(())
        }

        async fn get_player(&mut self, with_common_requests: bool) -> Result<&'static str, Self::Error> {
            let credential = self
                .coordinator
                .get_valid_credential(false, false)
                .await
                .map_err(|_| RemoteError("get_player"))?;
            self.recorder.push(format!(
                "get_player(common={}, identity={})",
                with_common_requests,
                credential.identity()
            ));
            Ok("player")
        }

        async fn get_remote_config_version(&mut self) -> Result<(), Self::Error> {
            self.step("get_remote_config_version")
        }

        async fn get_asset_digest(&mut self) -> Result<(), Self::Error> {
            self.step("get_asset_digest")
        }

        async fn get_item_templates(&mut self) -> Result<(), Self::Error> {
            self.step("get_item_templates")
        }

        async fn get_player_profile(&mut self) -> Result<(), Self::Error> {
            self.step("get_player_profile")
        }
    }

    fn session(
        fail_on: Option<&'static str>,
    ) -> (
        Session<FakeRemote, FixedProvider, TestClock>,
        Arc<Recorder>,
        oneshot::Receiver<()>,
    ) {
        let clock = TestClock::new(NOW);
        let coordinator = Arc::new(
            ReauthCoordinator::new(
                FixedProvider(Identity::from_static("leaf")),
                InMemoryCredentialStore::new().with_clock(clock.clone()),
            )
            .with_clock(clock),
        );
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = oneshot::channel();
        let remote = FakeRemote {
            recorder: recorder.clone(),
            fail_on,
            watcher_started: StdMutex::new(Some(tx)),
            coordinator: coordinator.clone(),
        };
        (Session::new(coordinator, remote), recorder, rx)
    }

    #[tokio::test]
    async fn bootstrap_runs_steps_in_order() -> Result<()> {
        let (mut session, recorder, watcher_started) = session(None);

        let player = session.bootstrap().await?;

        assert_eq!(player, "player");
        assert_eq!(session.started_at(), Some(NOW));
        assert_eq!(
            recorder.calls(),
            [
                "build_requests@1700000000000",
                "get_player(common=false, identity=leaf)",
                "get_remote_config_version",
                "get_asset_digest",
                "get_item_templates",
                "get_player_profile",
            ]
        );
        watcher_started.await?;
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_stops_at_first_failure() {
        let (mut session, recorder, _watcher_started) = session(Some("get_asset_digest"));

        let err = session.bootstrap().await.unwrap_err();

        assert_eq!(err.to_string(), "remote call get_asset_digest failed");
        assert_eq!(recorder.calls().last().map(String::as_str), Some("get_asset_digest"));
        assert!(!recorder.calls().iter().any(|c| c == "get_item_templates"));
    }

    #[tokio::test]
    async fn facade_delegates_credential_operations() -> Result<()> {
        let (session, _recorder, _watcher_started) = session(None);

        assert!(!session.install_session_ticket(SessionTicket::new(NOW)).await);

        let credential = session.get_valid_credential(false, true).await?;
        assert_eq!(credential.identity().as_str(), "leaf");

        let ticket = SessionTicket::new(NOW + std::time::Duration::from_secs(3600))
            .with_payload(vec![1, 2], vec![3]);
        assert!(session.install_session_ticket(ticket.clone()).await);
        let held = session.coordinator().current().await;
        assert_eq!(held.and_then(|c| c.session_ticket().cloned()), Some(ticket));
        Ok(())
    }
}
