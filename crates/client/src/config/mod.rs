//! Client configuration
//!
//! [`ClientConfig`] is immutable once built. [`ClientConfigBuilder`] validates
//! the mandatory fields and derives every endpoint from the environment URL
//! unless it is overridden explicitly. [`loader`] reads the same settings from
//! `AUTHRELAY_*` environment variables or a TOML/JSON file.

pub mod loader;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::KdfParams;
use crate::http::envelope::build_query_string;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths, ConfigFile};

/// Default API version segment used by [`ClientConfig::api_url`].
pub const DEFAULT_API_VERSION: &str = "2";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const UNKNOWN_APPLICATION: &str = "UnknownApplication";
const UNKNOWN_VERSION: &str = "UnknownVersion";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is missing")]
    Missing(&'static str),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Settings for one OAuth client against one provider environment.
#[derive(Clone)]
pub struct ClientConfig {
    pub environment_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub app_url_scheme: String,
    pub redirect_url: String,
    pub authorization_url: String,
    pub token_url: String,
    pub signup_url: String,
    pub forgot_password_url: String,
    pub server_client_id: String,
    pub server_redirect_uri: String,
    pub api_version: String,
    /// Log response bodies at debug level
    pub debug_mode: bool,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Keychain service name the credential fields live under
    pub storage_namespace: String,
    /// Non-secret device identifier bound into the encryption salt
    pub device_id: String,
    pub kdf: KdfParams,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("environment_url", &self.environment_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .field("token_url", &self.token_url)
            .field("api_version", &self.api_version)
            .field("debug_mode", &self.debug_mode)
            .field("request_timeout", &self.request_timeout)
            .field("storage_namespace", &self.storage_namespace)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Start building a configuration.
    pub fn builder(
        environment_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        app_url_scheme: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(environment_url, client_id, client_secret, app_url_scheme)
    }

    /// Browser URL that starts the authorization-code login flow.
    ///
    /// # Examples
    /// ```
    /// use authrelay_client::config::ClientConfig;
    ///
    /// let config = ClientConfig::builder("https://id.example.com", "abc", "s3cret", "myapp")
    ///     .device_id("device-1")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(
    ///     config.authorization_url_for_login(),
    ///     "https://id.example.com/flow/login?client_id=abc&redirect_uri=myapp%3A%2F%2Flogin\
    ///      &grant_type=authorization_code&response_type=code&platform=mobile&force=1"
    /// );
    /// ```
    #[must_use]
    pub fn authorization_url_for_login(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&grant_type=authorization_code&response_type=code&platform=mobile&force=1",
            self.authorization_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&format!("{}login", self.redirect_url)),
        )
    }

    /// Absolute URL of an API path, e.g. `api_url("me")`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.environment_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    environment_url: String,
    client_id: String,
    client_secret: String,
    app_url_scheme: String,
    redirect_url: Option<String>,
    authorization_url: Option<String>,
    token_url: Option<String>,
    signup_url: Option<String>,
    forgot_password_url: Option<String>,
    server_client_id: Option<String>,
    server_redirect_uri: Option<String>,
    api_version: Option<String>,
    debug_mode: bool,
    app_name: Option<String>,
    app_version: Option<String>,
    user_agent: Option<String>,
    request_timeout: Option<Duration>,
    storage_namespace: Option<String>,
    device_id: Option<String>,
    kdf: Option<KdfParams>,
}

impl ClientConfigBuilder {
    pub fn new(
        environment_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        app_url_scheme: impl Into<String>,
    ) -> Self {
        Self {
            environment_url: environment_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            app_url_scheme: app_url_scheme.into(),
            ..Self::default()
        }
    }

    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn signup_url(mut self, url: impl Into<String>) -> Self {
        self.signup_url = Some(url.into());
        self
    }

    pub fn forgot_password_url(mut self, url: impl Into<String>) -> Self {
        self.forgot_password_url = Some(url.into());
        self
    }

    pub fn server_client_id(mut self, id: impl Into<String>) -> Self {
        self.server_client_id = Some(id.into());
        self
    }

    pub fn server_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.server_redirect_uri = Some(uri.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Application name and version reported in the default user agent.
    pub fn app_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self.app_version = Some(version.into());
        self
    }

    /// Replace the generated user agent entirely.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = Some(namespace.into());
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = Some(kdf);
        self
    }

    /// Validate and derive defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` if a mandatory value is blank and
    /// `ConfigError::Invalid` if the environment URL is not absolute or the
    /// timeout is zero.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        require(&self.client_id, "client_id")?;
        require(&self.client_secret, "client_secret")?;
        require(&self.app_url_scheme, "app_url_scheme")?;
        require(&self.environment_url, "environment_url")?;

        let device_id = non_blank(self.device_id).ok_or(ConfigError::Missing("device_id"))?;

        let environment_url = self.environment_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&environment_url).map_err(|e| ConfigError::Invalid {
            field: "environment_url",
            message: e.to_string(),
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }

        let redirect_url = non_blank(self.redirect_url)
            .unwrap_or_else(|| format!("{}://", self.app_url_scheme));

        let forgot_password_url = non_blank(self.forgot_password_url).unwrap_or_else(|| {
            let mut params = std::collections::BTreeMap::new();
            params.insert("client_id".to_string(), self.client_id.clone());
            params.insert("redirect_uri".to_string(), redirect_url.clone());
            format!("{environment_url}/flow/password{}", build_query_string(&params))
        });

        let user_agent = non_blank(self.user_agent).unwrap_or_else(|| {
            default_user_agent(
                self.app_name.as_deref().unwrap_or(UNKNOWN_APPLICATION),
                self.app_version.as_deref().unwrap_or(UNKNOWN_VERSION),
            )
        });

        Ok(ClientConfig {
            authorization_url: non_blank(self.authorization_url)
                .unwrap_or_else(|| format!("{environment_url}/flow/login")),
            token_url: non_blank(self.token_url)
                .unwrap_or_else(|| format!("{environment_url}/oauth/token")),
            signup_url: non_blank(self.signup_url)
                .unwrap_or_else(|| format!("{environment_url}/flow/signup")),
            forgot_password_url,
            server_client_id: non_blank(self.server_client_id)
                .unwrap_or_else(|| self.client_id.clone()),
            server_redirect_uri: non_blank(self.server_redirect_uri)
                .unwrap_or_else(|| redirect_url.clone()),
            api_version: non_blank(self.api_version)
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            storage_namespace: non_blank(self.storage_namespace)
                .unwrap_or_else(|| format!("authrelay.{}", self.client_id)),
            kdf: self.kdf.unwrap_or_default(),
            debug_mode: self.debug_mode,
            redirect_url,
            user_agent,
            request_timeout,
            device_id,
            environment_url,
            client_id: self.client_id,
            client_secret: self.client_secret,
            app_url_scheme: self.app_url_scheme,
        })
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_user_agent(app_name: &str, app_version: &str) -> String {
    format!(
        "{app_name}/{app_version} authrelay/{} {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    //! Unit tests for config.
    use super::*;

    fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new("https://id.example.com/", "client-1", "secret-1", "myapp")
            .device_id("device-1")
    }

    /// Validates the defaults derived from the environment URL.
    #[test]
    fn build_derives_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.environment_url, "https://id.example.com");
        assert_eq!(config.redirect_url, "myapp://");
        assert_eq!(config.authorization_url, "https://id.example.com/flow/login");
        assert_eq!(config.token_url, "https://id.example.com/oauth/token");
        assert_eq!(config.signup_url, "https://id.example.com/flow/signup");
        assert_eq!(
            config.forgot_password_url,
            "https://id.example.com/flow/password?client_id=client-1&redirect_uri=myapp%3A%2F%2F"
        );
        assert_eq!(config.server_client_id, "client-1");
        assert_eq!(config.server_redirect_uri, "myapp://");
        assert_eq!(config.api_version, "2");
        assert!(!config.debug_mode);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.storage_namespace, "authrelay.client-1");
        assert_eq!(config.kdf, KdfParams::default());
    }

    /// Validates that explicit overrides win over derived defaults.
    #[test]
    fn overrides_take_precedence() {
        let config = builder()
            .redirect_url("myapp://callback/")
            .token_url("https://auth.example.com/token")
            .server_client_id("server-1")
            .api_version("3")
            .storage_namespace("custom")
            .build()
            .unwrap();

        assert_eq!(config.token_url, "https://auth.example.com/token");
        assert_eq!(config.server_client_id, "server-1");
        assert_eq!(config.server_redirect_uri, "myapp://callback/");
        assert_eq!(config.api_url("/me"), "https://id.example.com/api/3/me");
        assert_eq!(config.storage_namespace, "custom");
    }

    /// Validates that blank mandatory fields are rejected.
    #[test]
    fn missing_mandatory_fields() {
        let err = ClientConfigBuilder::new("https://id.example.com", " ", "s", "app")
            .device_id("d")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("client_id"));

        let err = ClientConfigBuilder::new("https://id.example.com", "c", "", "app")
            .device_id("d")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("client_secret"));

        let err =
            ClientConfigBuilder::new("https://id.example.com", "c", "s", "app").build().unwrap_err();
        assert_eq!(err, ConfigError::Missing("device_id"));
    }

    /// Validates rejection of relative environment URLs.
    #[test]
    fn invalid_environment_url() {
        let err = ClientConfigBuilder::new("id.example.com", "c", "s", "app")
            .device_id("d")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "environment_url", .. }));
    }

    /// Validates the login URL format.
    #[test]
    fn login_url() {
        let config = builder().build().unwrap();
        assert_eq!(
            config.authorization_url_for_login(),
            "https://id.example.com/flow/login?client_id=client-1&redirect_uri=myapp%3A%2F%2Flogin&grant_type=authorization_code&response_type=code&platform=mobile&force=1"
        );
    }

    /// Validates the generated user agent.
    #[test]
    fn user_agent_includes_app_and_crate() {
        let config = builder().app_info("Reader", "4.2").build().unwrap();
        assert!(config.user_agent.starts_with("Reader/4.2 authrelay/"));

        let config = builder().build().unwrap();
        assert!(config.user_agent.starts_with("UnknownApplication/UnknownVersion "));

        let config = builder().user_agent("custom/1").build().unwrap();
        assert_eq!(config.user_agent, "custom/1");
    }

    /// Validates that debug output hides the client secret.
    #[test]
    fn debug_redacts_secret() {
        let output = format!("{:?}", builder().build().unwrap());
        assert!(!output.contains("secret-1"));
        assert!(output.contains("client-1"));
    }
}
