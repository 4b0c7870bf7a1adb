//! Token endpoint calls
//!
//! A [`TokenExchange`] posts one grant to the token endpoint and decodes the
//! result. It never retries and never touches coordinator state; the
//! coordinator decides what to do with the outcome.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{AccessToken, TokenResponse};
use crate::config::ClientConfig;
use crate::error::{AuthError, AuthResult};
use crate::http::{HttpTransport, RequestEnvelope, ResponseEnvelope};

/// Grant presented to the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    /// Code returned by the browser login redirect
    AuthorizationCode { code: String },
    /// Refresh token of the current access token
    RefreshToken { refresh_token: String },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.grant_type())
    }
}

impl Grant {
    /// Value of the `grant_type` form field.
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Performs token endpoint calls for one client.
pub struct TokenExchange<T: HttpTransport> {
    transport: Arc<T>,
    config: Arc<ClientConfig>,
}

impl<T: HttpTransport> Clone for TokenExchange<T> {
    fn clone(&self) -> Self {
        Self { transport: Arc::clone(&self.transport), config: Arc::clone(&self.config) }
    }
}

impl<T: HttpTransport> TokenExchange<T> {
    pub fn new(transport: Arc<T>, config: Arc<ClientConfig>) -> Self {
        Self { transport, config }
    }

    /// Build the token request envelope for `grant`.
    #[must_use]
    pub fn envelope(&self, grant: &Grant) -> RequestEnvelope {
        let envelope = RequestEnvelope::post(&self.config.token_url)
            .body("grant_type", grant.grant_type())
            .body("client_id", &self.config.client_id)
            .body("client_secret", &self.config.client_secret)
            .body("redirect_uri", &self.config.redirect_url);

        match grant {
            Grant::AuthorizationCode { code } => envelope.body("code", code),
            Grant::RefreshToken { refresh_token } => envelope.body("refresh_token", refresh_token),
        }
    }

    /// Exchange `grant` for a new access token.
    ///
    /// # Errors
    /// Returns the classified error of the token response, `InvalidResponse`
    /// if a successful body is not a token, or `Network` on transport failure.
    pub async fn exchange(&self, grant: &Grant) -> AuthResult<AccessToken> {
        info!(grant_type = grant.grant_type(), "Requesting access token");

        let request = self.envelope(grant).into_http_request(&self.config.user_agent);

        let raw = self.transport.send(request).await?;
        let response = ResponseEnvelope::from_raw(raw);
        if self.config.debug_mode {
            debug!(status = response.status_code, body = %response.body, "Token endpoint response");
        }

        let body = response.into_result().map_err(|e| {
            warn!(grant_type = grant.grant_type(), error = %e, "Token exchange rejected");
            e
        })?;

        let token_response: TokenResponse = serde_json::from_value(body.clone())
            .map_err(|_| AuthError::InvalidResponse { body: body.to_string() })?;
        let token = AccessToken::try_from(token_response)?;

        info!(
            grant_type = grant.grant_type(),
            user_id = %token.user_id,
            expires_in = token.seconds_until_expiry(),
            "Access token issued"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::token_exchange.
    use super::*;
    use crate::http::RawResponse;
    use crate::testing::ScriptedTransport;

    fn config() -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder("https://id.example.com", "client-1", "secret-1", "myapp")
                .device_id("device-1")
                .build()
                .unwrap(),
        )
    }

    /// Validates the form fields of a refresh grant.
    #[test]
    fn refresh_grant_form() {
        let exchange = TokenExchange::new(Arc::new(ScriptedTransport::new()), config());
        let request = exchange
            .envelope(&Grant::RefreshToken { refresh_token: "r-1".into() })
            .into_http_request("ua");

        assert_eq!(request.url, "https://id.example.com/oauth/token");
        assert_eq!(request.form_value("grant_type"), Some("refresh_token"));
        assert_eq!(request.form_value("refresh_token"), Some("r-1"));
        assert_eq!(request.form_value("client_id"), Some("client-1"));
        assert_eq!(request.form_value("client_secret"), Some("secret-1"));
        assert_eq!(request.form_value("redirect_uri"), Some("myapp://"));
        assert!(request.form_value("code").is_none());
    }

    /// Validates a successful authorization-code exchange.
    #[tokio::test]
    async fn authorization_code_exchange() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(
            "/oauth/token",
            RawResponse::new(
                200,
                r#"{"access_token":"a-1","expires_in":3600,"refresh_token":"r-1","user_id":42}"#,
            ),
        );

        let exchange = TokenExchange::new(Arc::clone(&transport), config());
        let token =
            exchange.exchange(&Grant::AuthorizationCode { code: "c-1".into() }).await.unwrap();

        assert_eq!(token.access_token, "a-1");
        assert_eq!(token.user_id, "42");
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].form_value("code"), Some("c-1"));
        assert_eq!(sent[0].header("User-Agent"), Some(config().user_agent.as_str()));
    }

    /// Validates that a provider rejection is classified and returned.
    #[tokio::test]
    async fn rejected_exchange_is_classified() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(
            "/oauth/token",
            RawResponse::new(401, r#"{"error":"invalid_client","type":"OAuthException"}"#),
        );

        let exchange = TokenExchange::new(Arc::clone(&transport), config());
        let err = exchange
            .exchange(&Grant::RefreshToken { refresh_token: "r-1".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::OAuth(ref d) if d.error == "invalid_client"));
    }

    /// Validates that a success body without a token is invalid.
    #[tokio::test]
    async fn success_without_token_is_invalid_response() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response("/oauth/token", RawResponse::new(200, r#"{"ok":true}"#));

        let exchange = TokenExchange::new(Arc::clone(&transport), config());
        let err = exchange
            .exchange(&Grant::RefreshToken { refresh_token: "r-1".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidResponse { .. }));
    }

    /// Validates that grants never print their secret in debug output.
    #[test]
    fn grant_debug_hides_secret() {
        let grant = Grant::RefreshToken { refresh_token: "very-secret".into() };
        assert_eq!(format!("{grant:?}"), "refresh_token");
    }
}
