//! Configuration loader
//!
//! Loads [`ClientConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file into the process environment if one exists
//! 2. Attempts to load from `AUTHRELAY_*` environment variables
//! 3. If incomplete, falls back to the first config file found
//! 4. Supports JSON and TOML formats, detected by extension
//!
//! ## Environment Variables
//! Required:
//! - `AUTHRELAY_ENVIRONMENT_URL`: Provider base URL
//! - `AUTHRELAY_CLIENT_ID`: OAuth client id
//! - `AUTHRELAY_CLIENT_SECRET`: OAuth client secret
//! - `AUTHRELAY_APP_URL_SCHEME`: Scheme of the app redirect URL
//! - `AUTHRELAY_DEVICE_ID`: Device identifier used for credential encryption
//!
//! Optional:
//! - `AUTHRELAY_REDIRECT_URL`, `AUTHRELAY_TOKEN_URL`, `AUTHRELAY_API_VERSION`
//! - `AUTHRELAY_STORAGE_NAMESPACE`
//! - `AUTHRELAY_REQUEST_TIMEOUT_SECS`: Request timeout in seconds
//! - `AUTHRELAY_DEBUG_MODE`: Whether to log response bodies (true/false)
//!
//! ## File Locations
//! The loader probes, relative to the working directory:
//! 1. `./authrelay.toml` or `./authrelay.json`
//! 2. `./config.toml` or `./config.json`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::{ClientConfig, ClientConfigBuilder, ConfigError};
use crate::crypto::KdfParams;

/// On-disk configuration shape.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub environment_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub app_url_scheme: String,
    pub device_id: Option<String>,
    pub redirect_url: Option<String>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub signup_url: Option<String>,
    pub forgot_password_url: Option<String>,
    pub server_client_id: Option<String>,
    pub server_redirect_uri: Option<String>,
    pub api_version: Option<String>,
    pub debug_mode: bool,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub storage_namespace: Option<String>,
    pub kdf: Option<KdfParams>,
}

impl ConfigFile {
    /// Convert into a builder carrying every value that was set.
    #[must_use]
    pub fn into_builder(self) -> ClientConfigBuilder {
        let mut builder = ClientConfigBuilder::new(
            self.environment_url,
            self.client_id,
            self.client_secret,
            self.app_url_scheme,
        )
        .debug_mode(self.debug_mode);

        if let Some(device_id) = self.device_id {
            builder = builder.device_id(device_id);
        }
        if let Some(url) = self.redirect_url {
            builder = builder.redirect_url(url);
        }
        if let Some(url) = self.authorization_url {
            builder = builder.authorization_url(url);
        }
        if let Some(url) = self.token_url {
            builder = builder.token_url(url);
        }
        if let Some(url) = self.signup_url {
            builder = builder.signup_url(url);
        }
        if let Some(url) = self.forgot_password_url {
            builder = builder.forgot_password_url(url);
        }
        if let Some(id) = self.server_client_id {
            builder = builder.server_client_id(id);
        }
        if let Some(uri) = self.server_redirect_uri {
            builder = builder.server_redirect_uri(uri);
        }
        if let Some(version) = self.api_version {
            builder = builder.api_version(version);
        }
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        if let Some(namespace) = self.storage_namespace {
            builder = builder.storage_namespace(namespace);
        }
        if let Some(kdf) = self.kdf {
            builder = builder.kdf(kdf);
        }
        if let Some(name) = self.app_name {
            builder = builder.app_info(name, self.app_version.unwrap_or_default());
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        builder
    }
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ConfigError` if neither the environment nor any probed file yields
/// a valid configuration.
pub fn load() -> Result<ClientConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `AUTHRELAY_*` environment variables.
///
/// # Errors
/// Returns `ConfigError::Missing` for an unset required variable and
/// `ConfigError::Invalid` for an unparseable value.
pub fn load_from_env() -> Result<ClientConfig, ConfigError> {
    let mut builder = ClientConfigBuilder::new(
        env_var("AUTHRELAY_ENVIRONMENT_URL")?,
        env_var("AUTHRELAY_CLIENT_ID")?,
        env_var("AUTHRELAY_CLIENT_SECRET")?,
        env_var("AUTHRELAY_APP_URL_SCHEME")?,
    )
    .device_id(env_var("AUTHRELAY_DEVICE_ID")?)
    .debug_mode(env_bool("AUTHRELAY_DEBUG_MODE", false));

    if let Some(url) = env_opt("AUTHRELAY_REDIRECT_URL") {
        builder = builder.redirect_url(url);
    }
    if let Some(url) = env_opt("AUTHRELAY_TOKEN_URL") {
        builder = builder.token_url(url);
    }
    if let Some(version) = env_opt("AUTHRELAY_API_VERSION") {
        builder = builder.api_version(version);
    }
    if let Some(namespace) = env_opt("AUTHRELAY_STORAGE_NAMESPACE") {
        builder = builder.storage_namespace(namespace);
    }
    if let Some(raw) = env_opt("AUTHRELAY_REQUEST_TIMEOUT_SECS") {
        let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            field: "AUTHRELAY_REQUEST_TIMEOUT_SECS",
            message: e.to_string(),
        })?;
        builder = builder.request_timeout(Duration::from_secs(secs));
    }

    builder.build()
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `ConfigError::Load` if the file is missing, unreadable or not
/// valid TOML/JSON, and the builder's errors if the values are invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Load(format!("config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ConfigError::Load("no config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::Load(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)?.into_builder().build()
}

fn parse_config(contents: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Load(format!("invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Load(format!("invalid JSON format: {e}"))),
        _ => Err(ConfigError::Load(format!("unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    ["authrelay.toml", "authrelay.json", "config.toml", "config.json"]
        .into_iter()
        .map(|name| cwd.join(name))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String, ConfigError> {
    env_opt(key).ok_or_else(|| {
        tracing::debug!(key, "Missing required environment variable");
        ConfigError::Load(format!("missing required environment variable: {key}"))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
