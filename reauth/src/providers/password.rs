//! Password-grant sign-in against Google and Pokémon Trainer Club token endpoints

use std::time::Duration;

use async_trait::async_trait;
use reauth_clock::{Clock, System};

use super::{dto, LoginProvider, ProviderError};
use crate::{
    config::{AccountSettings, AuthType, ConfigError, Settings},
    Credential, Identity, IdentityRef, Password, ProviderId,
};

#[derive(Debug)]
struct PasswordExchange<C> {
    client: reqwest::Client,
    token_url: reqwest::Url,
    username: Identity,
    password: Password,
    clock: C,
}

impl PasswordExchange<System> {
    fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        username: Identity,
        password: Password,
    ) -> Self {
        Self {
            client,
            token_url,
            username,
            password,
            clock: System,
        }
    }
}

impl<C> PasswordExchange<C> {
    fn with_clock<D>(self, clock: D) -> PasswordExchange<D> {
        PasswordExchange {
            client: self.client,
            token_url: self.token_url,
            username: self.username,
            password: self.password,
            clock,
        }
    }
}

impl<C: Clock> PasswordExchange<C> {
    #[tracing::instrument(
        err,
        skip(self, classify),
        fields(
            token_url = %self.token_url,
            identity = %self.username,
        ),
    )]
    async fn request_credential(
        &self,
        provider: ProviderId,
        classify: fn(&str) -> ProviderError,
    ) -> Result<Credential, ProviderError> {
        tracing::trace!("requesting credential from identity provider");

        let grant = dto::PasswordGrant::new(&self.username, &self.password);
        let resp = self
            .client
            .post(self.token_url.clone())
            .json(&grant)
            .send()
            .await
            .map_err(|e| ProviderError::generic("error sending sign-in request").with_source(e))?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received sign-in response from identity provider"
        );

        if let Err(error) = resp.error_for_status_ref() {
            let body = resp.text().await.map_err(|e| {
                ProviderError::generic("error reading sign-in error body").with_source(e)
            })?;
            return Err(classify(&body).with_source(error));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::generic("error reading sign-in response").with_source(e))?;
        let resp: dto::TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::generic("error deserializing sign-in response").with_source(e))?;

        let expiry = resp
            .expires_in
            .map(|secs| self.clock.now() + Duration::from_secs(secs));

        tracing::info!(
            expires = expiry.is_some(),
            expiry = expiry.map(|e| e.as_millis()),
            "received new access token"
        );

        Ok(Credential::new(
            self.username.clone(),
            provider,
            Some(resp.access_token),
            expiry,
        ))
    }
}

fn generic_failure(body: &str) -> ProviderError {
    ProviderError::generic(format!("identity provider rejected sign-in: {}", body))
}

/// Whether the authority's error body asks for a sign-in through a browser
fn requires_browser(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("needsbrowser")
        || body.contains("log into a browser")
        || body.contains("log into an browser")
}

fn google_failure(body: &str) -> ProviderError {
    if requires_browser(body) {
        ProviderError::interactive_step_required(format!(
            "google account requires signing in through a browser first: {}",
            body
        ))
    } else {
        generic_failure(body)
    }
}

/// Signs in to a Google account with a username and password
#[derive(Debug)]
pub struct GoogleLoginProvider<C = System> {
    exchange: PasswordExchange<C>,
}

impl GoogleLoginProvider<System> {
    /// Constructs a new Google sign-in provider
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        username: Identity,
        password: Password,
    ) -> Self {
        Self {
            exchange: PasswordExchange::new(client, token_url, username, password),
        }
    }
}

impl<C> GoogleLoginProvider<C> {
    /// Sets a custom clock to be used when stamping token expiry
    pub fn with_clock<D>(self, clock: D) -> GoogleLoginProvider<D> {
        GoogleLoginProvider {
            exchange: self.exchange.with_clock(clock),
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> LoginProvider for GoogleLoginProvider<C> {
    fn identity(&self) -> &IdentityRef {
        &self.exchange.username
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Google
    }

    async fn obtain_credential(&mut self) -> Result<Credential, ProviderError> {
        self.exchange
            .request_credential(ProviderId::Google, google_failure)
            .await
    }
}

/// Signs in to a Pokémon Trainer Club account with a username and password
#[derive(Debug)]
pub struct PtcLoginProvider<C = System> {
    exchange: PasswordExchange<C>,
}

impl PtcLoginProvider<System> {
    /// Constructs a new Pokémon Trainer Club sign-in provider
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        username: Identity,
        password: Password,
    ) -> Self {
        Self {
            exchange: PasswordExchange::new(client, token_url, username, password),
        }
    }
}

impl<C> PtcLoginProvider<C> {
    /// Sets a custom clock to be used when stamping token expiry
    pub fn with_clock<D>(self, clock: D) -> PtcLoginProvider<D> {
        PtcLoginProvider {
            exchange: self.exchange.with_clock(clock),
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> LoginProvider for PtcLoginProvider<C> {
    fn identity(&self) -> &IdentityRef {
        &self.exchange.username
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Ptc
    }

    async fn obtain_credential(&mut self) -> Result<Credential, ProviderError> {
        self.exchange
            .request_credential(ProviderId::Ptc, generic_failure)
            .await
    }
}

fn parse_token_url(provider: ProviderId, account: &AccountSettings) -> Result<reqwest::Url, ConfigError> {
    reqwest::Url::parse(&account.token_url).map_err(|_| ConfigError::InvalidTokenUrl {
        provider,
        url: account.token_url.clone(),
    })
}

/// Selects and constructs the login provider named by the settings
pub fn login_provider_from_settings(
    client: reqwest::Client,
    settings: &Settings,
) -> Result<Box<dyn LoginProvider>, ConfigError> {
    let account = settings.selected_account()?;
    let provider = ProviderId::from(settings.auth_type);
    let token_url = parse_token_url(provider, account)?;
    let username = account.username.clone();
    let password = account.password.clone();

    let provider: Box<dyn LoginProvider> = match settings.auth_type {
        AuthType::Google => Box::new(GoogleLoginProvider::new(client, token_url, username, password)),
        AuthType::Ptc => Box::new(PtcLoginProvider::new(client, token_url, username, password)),
    };

    tracing::debug!(provider = %provider.provider_id(), identity = %provider.identity(), "selected login provider");
    Ok(provider)
}
