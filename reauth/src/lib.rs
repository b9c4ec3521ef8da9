//! Serialized management of layered client credentials
//!
//! A client of the remote service authenticates with two layers: a
//! long-lived access token obtained from an identity provider, and a
//! short-lived session ticket that the remote service issues during protocol
//! handshakes. This crate decides whether the credential currently held is
//! still usable, funnels every refresh through a single gate so that at most
//! one is ever in flight, persists credentials to a local cache keyed by
//! identity, and retries failed refreshes with a bounded, linear backoff.
//!
//! # General Flow
//!
//! Select a [login provider][providers::LoginProvider] from settings, pick a
//! [credential store][store::CredentialStore], and share a single
//! [`ReauthCoordinator`] between everything that needs credentials. The
//! protocol layer hands freshly issued tickets back with
//! [`ReauthCoordinator::install_session_ticket`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use reauth::{
//!     providers::PtcLoginProvider, store::FileCredentialStore, Identity, Password,
//!     ReauthCoordinator,
//! };
//!
//! let provider = PtcLoginProvider::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse("https://sso.example.com/token").unwrap(),
//!     Identity::from_static("ash"),
//!     Password::from_static("pikachu"),
//! );
//!
//! let coordinator = Arc::new(ReauthCoordinator::new(
//!     provider,
//!     FileCredentialStore::new("Cache"),
//! ));
//! # /* Commented out due to this trying to interact with the world.
//! let credential = coordinator.get_valid_credential(false, true).await?;
//! # */
//! ```
//!
//! This crate includes an example of bootstrapping a session from the
//! environment in the examples folder.
//!
//! # Features
//!
//! The following features are supported by this crate, all of which are enabled by default:
//!
//! * `file`: Provides a credential store using the local filesystem.
//! * `providers`: Provides Google and Pokémon Trainer Club password sign-in
//!   over [reqwest].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod backoff;
mod braids;
pub mod config;
mod coordinator;
mod credential;
pub mod providers;
mod session;
pub mod store;
pub mod validity;

pub use braids::*;
pub use coordinator::{ReauthCoordinator, ReauthError};
pub use credential::{Credential, ProviderId, SessionTicket};
pub use session::{BackgroundTask, RemoteSession, Session};
pub use validity::ValidityPolicy;
