//! Token lifecycle
//!
//! - [`types`]: the access token value and the token endpoint wire shape
//! - [`credential_store`]: encrypted persistence of the token
//! - [`token_exchange`]: authorization-code and refresh-token grants
//! - [`coordinator`]: single-flight refresh and replay of rejected requests

pub mod coordinator;
pub mod credential_store;
pub mod token_exchange;
pub mod types;

pub use coordinator::{PendingResponse, RefreshCoordinator, RefreshState};
pub use credential_store::CredentialStore;
pub use token_exchange::{Grant, TokenExchange};
pub use types::{AccessToken, TokenResponse};
