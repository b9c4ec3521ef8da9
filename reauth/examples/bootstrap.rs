use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use reauth::{
    config::{AccountSettings, AuthType, Settings},
    providers::{login_provider_from_settings, LoginProvider},
    store::FileCredentialStore,
    BackgroundTask, Identity, Password, ReauthCoordinator, ReauthError, RemoteSession, Session,
    SessionTicket,
};
use reauth_clock::{Clock, System, UnixMillis};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Provider {
    Google,
    Ptc,
}

#[derive(Debug, Parser)]
struct Opts {
    /// The identity provider to sign in with
    #[arg(short = 'a', long, env, value_enum)]
    auth_type: Provider,

    /// The account name
    #[arg(short, long, env)]
    username: String,

    /// The account password
    #[arg(short, long, env, hide_env_values = true)]
    password: String,

    /// The provider's token endpoint
    #[arg(short, long, env)]
    token_url: String,

    /// The directory used to cache credentials
    #[arg(short = 'd', long, env, default_value = "Cache")]
    cache_dir: PathBuf,

    /// Discard any held or cached credential and sign in again
    #[arg(long)]
    force_refresh: bool,
}

impl Opts {
    fn settings(&self) -> Settings {
        let account = AccountSettings {
            username: Identity::new(self.username.clone()),
            password: Password::new(self.password.clone()),
            token_url: self.token_url.clone(),
        };

        let (auth_type, google, ptc) = match self.auth_type {
            Provider::Google => (AuthType::Google, Some(account), None),
            Provider::Ptc => (AuthType::Ptc, None, Some(account)),
        };

        Settings {
            auth_type,
            google,
            ptc,
            cache_dir: Some(self.cache_dir.clone()),
        }
    }
}

type Coordinator = ReauthCoordinator<Box<dyn LoginProvider>>;

/// Stands in for the protocol layer: every call just checks for a usable
/// credential and pretends the handshake issued a ticket.
struct LoggingRemote {
    coordinator: Arc<Coordinator>,
}

impl LoggingRemote {
    async fn call(&self, name: &'static str) -> Result<(), ReauthError> {
        let credential = self.coordinator.get_valid_credential(false, true).await?;
        tracing::info!(
            call = name,
            identity = %credential.identity(),
            token = format_args!("{:#?}", credential.token()),
            "remote call"
        );

        let ticket = SessionTicket::new(System.now() + Duration::from_secs(30 * 60));
        self.coordinator.install_session_ticket(ticket).await;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for LoggingRemote {
    type Error = ReauthError;
    type PlayerState = UnixMillis;

    fn liveness_watcher(&self) -> BackgroundTask {
        Box::pin(async {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                tracing::debug!("remote service still reachable");
            }
        })
    }

    fn build_requests(&mut self, started_at: UnixMillis) -> Result<(), Self::Error> {
        tracing::info!(started_at = started_at.as_millis(), "request builder ready");
        Ok(())
    }

    async fn get_player(&mut self, with_common_requests: bool) -> Result<UnixMillis, Self::Error> {
        tracing::info!(with_common_requests, "fetching player");
        self.call("get_player").await?;
        Ok(System.now())
    }

    async fn get_remote_config_version(&mut self) -> Result<(), Self::Error> {
        self.call("get_remote_config_version").await
    }

    async fn get_asset_digest(&mut self) -> Result<(), Self::Error> {
        self.call("get_asset_digest").await
    }

    async fn get_item_templates(&mut self) -> Result<(), Self::Error> {
        self.call("get_item_templates").await
    }

    async fn get_player_profile(&mut self) -> Result<(), Self::Error> {
        self.call("get_player_profile").await
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let settings = opts.settings();

    let client = reqwest::Client::builder().https_only(true).build()?;
    let provider = login_provider_from_settings(client, &settings)?;
    let store = match &settings.cache_dir {
        Some(dir) => FileCredentialStore::new(dir.clone()),
        None => FileCredentialStore::in_working_dir()?,
    };

    let coordinator = Arc::new(ReauthCoordinator::new(provider, store));

    if opts.force_refresh {
        coordinator.get_valid_credential(true, true).await?;
    }

    let remote = LoggingRemote {
        coordinator: coordinator.clone(),
    };
    let mut session = Session::new(coordinator, remote);

    let player_fetched_at = session.bootstrap().await?;

    tracing::info!(
        started_at = session.started_at().map(|t| t.as_millis()),
        player_fetched_at = player_fetched_at.as_millis(),
        "session bootstrapped"
    );

    Ok(())
}
