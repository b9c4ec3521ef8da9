//! Decisions about whether a held credential can still be used

use std::time::Duration;

use reauth_clock::{Clock, UnixMillis};

use crate::Credential;

/// Decides whether a credential is usable as-is or must be refreshed
///
/// A session ticket is trusted only while its expiry lies more than `skew`
/// in the future. Once it comes within that window it is discarded and the
/// access token's own emptiness and expiry decide instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityPolicy {
    skew: Duration,
}

impl Default for ValidityPolicy {
    /// Default validity policy
    ///
    /// Uses a skew buffer of 10 minutes.
    fn default() -> Self {
        Self {
            skew: Duration::from_secs(10 * 60),
        }
    }
}

impl ValidityPolicy {
    /// Constructs a policy with a custom skew buffer
    pub const fn new(skew: Duration) -> Self {
        Self { skew }
    }

    /// The safety margin before a ticket's expiry at which it stops being trusted
    #[inline]
    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Whether the credential carries a session ticket that expires within
    /// the skew buffer of `time` (or already has)
    ///
    /// A credential without a ticket has nothing near expiry.
    pub fn ticket_near_expiry_at(&self, credential: &Credential, time: UnixMillis) -> bool {
        credential
            .session_ticket()
            .map_or(false, |ticket| ticket.expire_timestamp_ms() <= time + self.skew)
    }

    /// Same as [`ticket_near_expiry_at`][Self::ticket_near_expiry_at], using
    /// the time reported by `clock`
    #[inline]
    pub fn ticket_near_expiry<C: Clock>(&self, credential: &Credential, clock: &C) -> bool {
        self.ticket_near_expiry_at(credential, clock.now())
    }

    /// Whether the credential carries a session ticket that can be trusted
    /// on its own as of `time`
    pub fn has_trusted_ticket_at(&self, credential: &Credential, time: UnixMillis) -> bool {
        credential.session_ticket().is_some() && !self.ticket_near_expiry_at(credential, time)
    }

    /// Whether the credential is usable as of `time`
    ///
    /// A ticket close to expiry is cleared from `credential` as part of the
    /// evaluation.
    pub fn is_usable_at(&self, credential: &mut Credential, time: UnixMillis) -> bool {
        if self.ticket_near_expiry_at(credential, time) {
            tracing::debug!(
                identity = %credential.identity(),
                provider = %credential.provider(),
                "session ticket is about to expire, discarding it"
            );
            credential.set_session_ticket(None);
        }

        if credential.session_ticket().is_some() {
            return true;
        }

        !credential.needs_login_at(time)
    }

    /// Same as [`is_usable_at`][Self::is_usable_at], using the time reported
    /// by `clock`
    #[inline]
    pub fn is_usable<C: Clock>(&self, credential: &mut Credential, clock: &C) -> bool {
        self.is_usable_at(credential, clock.now())
    }
}
