//! Data transfer objects for password-grant token exchanges

use serde::{Deserialize, Serialize};

use crate::{AccessToken, IdentityRef, PasswordRef};

/// The password grant sent to the token endpoint
#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    /// Always `password`
    pub grant_type: &'static str,
    /// The account name
    pub username: &'a IdentityRef,
    /// The account password
    pub password: &'a PasswordRef,
}

impl<'a> PasswordGrant<'a> {
    /// Constructs a grant for the given account
    pub fn new(username: &'a IdentityRef, password: &'a PasswordRef) -> Self {
        Self {
            grant_type: "password",
            username,
            password,
        }
    }
}

/// A successful response from the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: AccessToken,
    /// The number of seconds the token is valid for, if it expires
    #[serde(default)]
    pub expires_in: Option<u64>,
}
