//! Identity providers that issue fresh credentials

use std::{error, fmt};

use async_trait::async_trait;
use thiserror::Error;

use crate::{Credential, IdentityRef, ProviderId};

#[cfg(feature = "providers")]
pub mod dto;
#[cfg(feature = "providers")]
mod password;

#[cfg(feature = "providers")]
pub use password::{login_provider_from_settings, GoogleLoginProvider, PtcLoginProvider};

/// How a provider failure should be treated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network, credential, or protocol trouble that may clear up on retry
    Generic,
    /// The account requires a manual, interactive sign-in step
    ///
    /// Retrying cannot succeed until a person completes that step.
    InteractiveStepRequired,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("generic"),
            Self::InteractiveStepRequired => f.write_str("interactive step required"),
        }
    }
}

/// An error while obtaining a credential from an identity provider
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn error::Error + Send + Sync + 'static>>,
}

impl ProviderError {
    /// Constructs an error of the given kind
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Constructs a retryable error
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Generic, message)
    }

    /// Constructs an error signalling that a manual sign-in step is needed
    pub fn interactive_step_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InteractiveStepRequired, message)
    }

    /// Attaches the underlying cause
    pub fn with_source(mut self, source: impl error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Gets the kind of failure
    #[inline]
    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    /// Whether another attempt could succeed
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind != ProviderErrorKind::InteractiveStepRequired
    }
}

/// An identity provider capable of issuing a fresh credential for a single,
/// configured account
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// The identity credentials will be issued to
    fn identity(&self) -> &IdentityRef;

    /// The kind of provider
    fn provider_id(&self) -> ProviderId;

    /// Performs a login and returns the resulting credential
    async fn obtain_credential(&mut self) -> Result<Credential, ProviderError>;
}

#[async_trait]
impl<T: LoginProvider + ?Sized> LoginProvider for Box<T> {
    fn identity(&self) -> &IdentityRef {
        (**self).identity()
    }

    fn provider_id(&self) -> ProviderId {
        (**self).provider_id()
    }

    async fn obtain_credential(&mut self) -> Result<Credential, ProviderError> {
        (**self).obtain_credential().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interactive_step_is_fatal() {
        assert!(ProviderError::generic("timed out").is_retryable());
        assert!(!ProviderError::interactive_step_required("NeedsBrowser").is_retryable());
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = ProviderError::generic("request failed").with_source(io);

        assert_eq!(err.to_string(), "request failed");
        let source = error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("reset"));
    }
}
