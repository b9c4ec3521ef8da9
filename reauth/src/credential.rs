use reauth_clock::{Clock, System, UnixMillis};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AccessToken, AccessTokenRef, Identity, IdentityRef};

/// The kind of identity provider that issued a credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Google account sign-in
    Google,
    /// Pokémon Trainer Club sign-in
    Ptc,
}

impl ProviderId {
    /// A stable lowercase name, used in cache record names
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Ptc => "ptc",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-lived proof of an active handshake with the remote service
///
/// Carried in memory only; it is overwritten wholesale whenever a new
/// handshake completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionTicket {
    expire_timestamp_ms: UnixMillis,
    start: Vec<u8>,
    end: Vec<u8>,
}

impl SessionTicket {
    /// Constructs a ticket that the remote service will void at `expire_timestamp_ms`
    pub fn new(expire_timestamp_ms: UnixMillis) -> Self {
        Self {
            expire_timestamp_ms,
            start: Vec::new(),
            end: Vec::new(),
        }
    }

    /// Attaches the opaque payload the remote service issued with the ticket
    pub fn with_payload(mut self, start: Vec<u8>, end: Vec<u8>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// The time at which the remote service considers this ticket void
    #[inline]
    pub fn expire_timestamp_ms(&self) -> UnixMillis {
        self.expire_timestamp_ms
    }

    /// Leading opaque payload
    #[inline]
    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// Trailing opaque payload
    #[inline]
    pub fn end(&self) -> &[u8] {
        &self.end
    }
}

/// An access token together with the session ticket layered on top of it
///
/// A credential is identified by its `(identity, provider)` pair. Only the
/// identity, provider, token and expiry are ever persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    identity: Identity,
    provider: ProviderId,
    #[serde(default)]
    token: Option<AccessToken>,
    #[serde(default)]
    expiry: Option<UnixMillis>,
    #[serde(skip)]
    session_ticket: Option<SessionTicket>,
}

impl Credential {
    /// Constructs a credential without a session ticket
    ///
    /// An `expiry` of `None` marks a token that never expires.
    pub fn new(
        identity: Identity,
        provider: ProviderId,
        token: Option<AccessToken>,
        expiry: Option<UnixMillis>,
    ) -> Self {
        Self {
            identity,
            provider,
            token,
            expiry,
            session_ticket: None,
        }
    }

    /// Gets the identity the credential was issued to
    #[inline]
    pub fn identity(&self) -> &IdentityRef {
        &self.identity
    }

    /// Gets the provider that issued the credential
    #[inline]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Gets the access token, if one was issued
    #[inline]
    pub fn token(&self) -> Option<&AccessTokenRef> {
        self.token.as_deref()
    }

    /// Gets the time at which the access token expires, if it does
    #[inline]
    pub fn expiry(&self) -> Option<UnixMillis> {
        self.expiry
    }

    /// Gets the current session ticket
    #[inline]
    pub fn session_ticket(&self) -> Option<&SessionTicket> {
        self.session_ticket.as_ref()
    }

    /// Replaces the session ticket, returning the previous one
    pub fn set_session_ticket(&mut self, ticket: Option<SessionTicket>) -> Option<SessionTicket> {
        std::mem::replace(&mut self.session_ticket, ticket)
    }

    /// Whether the token is absent or empty
    #[inline]
    pub fn has_empty_token(&self) -> bool {
        self.token().map_or(true, |t| t.as_str().is_empty())
    }

    /// Whether the access token has expired as of the provided time
    ///
    /// A token without an expiry never expires.
    #[inline]
    pub fn is_expired_at(&self, time: UnixMillis) -> bool {
        self.expiry.map_or(false, |expiry| expiry <= time)
    }

    /// Whether the access token has expired based on the current time as
    /// reported by the provided clock
    #[inline]
    pub fn is_expired_with_clock<C: Clock>(&self, clock: &C) -> bool {
        self.is_expired_at(clock.now())
    }

    /// Whether the access token has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_clock(&System)
    }

    /// Whether the credential can no longer stand in for a fresh login as of
    /// the provided time: its token is empty or expired
    #[inline]
    pub fn needs_login_at(&self, time: UnixMillis) -> bool {
        self.has_empty_token() || self.is_expired_at(time)
    }

    /// Forces the credential to be treated as expired as of `time`
    ///
    /// The session ticket is dropped along with it.
    pub fn expire_at(&mut self, time: UnixMillis) {
        self.expiry = Some(time);
        self.session_ticket = None;
    }
}
