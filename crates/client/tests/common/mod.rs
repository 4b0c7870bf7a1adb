//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use authrelay_client::auth::{AccessToken, RefreshCoordinator};
use authrelay_client::config::ClientConfig;
use authrelay_client::crypto::KdfParams;
use authrelay_client::http::RawResponse;
use authrelay_client::storage::MemoryStore;
use authrelay_client::testing::ScriptedTransport;

pub const TOKEN_PATH: &str = "/oauth/token";
pub const ITEMS_PATH: &str = "/api/2/items";

pub type ScriptedCoordinator = RefreshCoordinator<ScriptedTransport, MemoryStore>;

/// Route tracing output through the test harness writer once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn config(environment_url: &str) -> ClientConfig {
    ClientConfig::builder(environment_url, "client-1", "secret-1", "myapp")
        .device_id("device-1")
        .kdf(KdfParams::minimal())
        .app_info("IntegrationTests", "1.0")
        .build()
        .expect("valid test config")
}

/// Coordinator over a scripted transport, holding `access` / `refresh`.
pub fn scripted(
    access: &str,
    refresh: &str,
) -> (ScriptedCoordinator, Arc<ScriptedTransport>, MemoryStore) {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::new());
    let store = MemoryStore::new();
    let coordinator = RefreshCoordinator::from_shared(
        Arc::new(config("https://id.example.com")),
        Arc::clone(&transport),
        Arc::new(store.clone()),
    );
    coordinator
        .set_access_token(AccessToken::new(access, 3600, refresh, "user-1"))
        .expect("token persisted");
    (coordinator, transport, store)
}

pub fn token_body(access: &str, refresh: &str) -> String {
    format!(
        r#"{{"access_token":"{access}","expires_in":3600,"refresh_token":"{refresh}","user_id":"user-1"}}"#
    )
}

pub fn token_response(access: &str, refresh: &str) -> RawResponse {
    RawResponse::new(200, token_body(access, refresh))
}
