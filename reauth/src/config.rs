//! Settings that select and configure the identity provider

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::{Identity, Password, ProviderId};

/// Which identity provider to sign in with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// Google account sign-in
    Google,
    /// Pokémon Trainer Club sign-in
    Ptc,
}

impl From<AuthType> for ProviderId {
    fn from(auth_type: AuthType) -> Self {
        match auth_type {
            AuthType::Google => ProviderId::Google,
            AuthType::Ptc => ProviderId::Ptc,
        }
    }
}

/// Account settings for one provider
#[derive(Clone, Debug, Deserialize)]
pub struct AccountSettings {
    /// The account name, used as the credential identity
    pub username: Identity,
    /// The account password
    pub password: Password,
    /// The provider's token endpoint
    pub token_url: String,
}

/// Client settings relevant to credential management
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// The provider to sign in with
    pub auth_type: AuthType,
    /// Google account settings
    #[serde(default)]
    pub google: Option<AccountSettings>,
    /// Pokémon Trainer Club account settings
    #[serde(default)]
    pub ptc: Option<AccountSettings>,
    /// Directory for cached credentials; defaults to `./Cache`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// An error in the supplied settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The selected provider has no account configured
    #[error("no account configured for {0} sign-in")]
    MissingAccount(ProviderId),
    /// The provider's token endpoint is not a valid URL
    #[error("invalid token url for {provider} sign-in: {url}")]
    InvalidTokenUrl {
        /// The provider whose URL is invalid
        provider: ProviderId,
        /// The offending URL
        url: String,
    },
}

impl Settings {
    /// The account settings for the selected provider
    pub fn selected_account(&self) -> Result<&AccountSettings, ConfigError> {
        let account = match self.auth_type {
            AuthType::Google => self.google.as_ref(),
            AuthType::Ptc => self.ptc.as_ref(),
        };

        account.ok_or_else(|| ConfigError::MissingAccount(self.auth_type.into()))
    }
}
