use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::envelope::{HttpMethod, HttpRequest};
use crate::error::{AuthError, AuthResult};

/// Status, headers and body text exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    /// Response with a body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }
}

/// Sends one wire request.
///
/// Implementations perform a single attempt; any I/O failure or timeout is
/// reported as [`AuthError::Network`]. Retry decisions belong to the
/// coordinator.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> AuthResult<RawResponse>;
}

/// Send `request`, resolving to a cancelled network error if `cancellation`
/// fires first.
pub async fn send_cancellable<T: HttpTransport + ?Sized>(
    transport: &T,
    request: HttpRequest,
    cancellation: Option<&CancellationToken>,
) -> AuthResult<RawResponse> {
    match cancellation {
        Some(token) => {
            if token.is_cancelled() {
                return Err(AuthError::cancelled());
            }
            let path = request.path().to_string();
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(url = %path, "HTTP request cancelled");
                    Err(AuthError::cancelled())
                }
                result = transport.send(request) => result,
            }
        }
        None => transport.send(request).await,
    }
}

/// [`HttpTransport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Transport with a request timeout and default settings otherwise.
    ///
    /// # Errors
    /// Returns `AuthError::Network` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        Self::builder().timeout(timeout).build()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AuthResult<RawResponse> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let path = request.path().to_string();
        debug!(%method, url = %path, "sending HTTP request");

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if request.method == HttpMethod::Post {
            builder = builder.form(&request.form);
        }

        let response = builder.send().await.map_err(|err| {
            debug!(%method, url = %path, error = %err, "HTTP request failed");
            network_error(&err)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|err| network_error(&err))?;

        debug!(%method, url = %path, status, "received HTTP response");
        Ok(RawResponse { status, headers, body })
    }
}

fn network_error(err: &reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::network(format!("request timed out: {err}"))
    } else {
        AuthError::network(err.to_string())
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    no_proxy: bool,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), no_proxy: false }
    }
}

impl ReqwestTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ignore system proxy settings.
    pub fn no_proxy(mut self, enabled: bool) -> Self {
        self.no_proxy = enabled;
        self
    }

    /// # Errors
    /// Returns `AuthError::Network` if the client cannot be constructed.
    pub fn build(self) -> AuthResult<ReqwestTransport> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout);
        if self.no_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|err| AuthError::network(format!("failed to build HTTP client: {err}")))?;

        Ok(ReqwestTransport { client })
    }
}
