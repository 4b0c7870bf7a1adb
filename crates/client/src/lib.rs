//! Client-side OAuth2 credential lifecycle management.
//!
//! `authrelay-client` owns an application's access token, runs authenticated
//! HTTP calls on its behalf and recovers from token expiry by coordinating a
//! single refresh across any number of concurrently failing calls.
//!
//! # Modules
//! - [`auth`]: token types, encrypted persistence, token exchange and the
//!   [`RefreshCoordinator`](auth::RefreshCoordinator)
//! - [`http`]: request envelopes, response classification and the transport
//!   seam
//! - [`error`]: the closed [`AuthError`] taxonomy
//! - [`crypto`]: per-field authenticated encryption
//! - [`storage`]: secret storage backends
//! - [`config`]: client configuration and its loaders
//! - [`testing`]: scripted transport for deterministic tests
//!
//! # Features
//! - `keychain` (default): platform keychain storage and
//!   [`RefreshCoordinator::with_keychain`](auth::RefreshCoordinator::with_keychain)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod http;
pub mod storage;
pub mod testing;

pub use auth::{AccessToken, RefreshCoordinator, RefreshState};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use error::{AuthError, AuthResult, ErrorClassification, ErrorDetails, ErrorSeverity};
pub use http::{RequestEnvelope, ResponseEnvelope};
