//! Mock implementations of the transport seam
//!
//! [`ScriptedTransport`] answers requests by URL path suffix. Each route has
//! a FIFO of one-shot responses, an optional fallback responder consulted
//! once the FIFO is empty, and an optional [`Gate`] that suspends matching
//! requests until released.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{AuthError, AuthResult};
use crate::http::{HttpRequest, HttpTransport, RawResponse, OAUTH_TOKEN_PARAM};

type Responder = Arc<dyn Fn(&HttpRequest) -> AuthResult<RawResponse> + Send + Sync>;

/// A request captured by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Zero-based arrival order across all routes
    pub sequence: usize,
    pub request: HttpRequest,
}

impl RecordedRequest {
    /// Bearer token carried by the request, from the query or the form.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.request
            .query_value(OAUTH_TOKEN_PARAM)
            .or_else(|| self.request.form_value(OAUTH_TOKEN_PARAM).map(str::to_string))
    }
}

impl Deref for RecordedRequest {
    type Target = HttpRequest;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

/// Holds matching requests until [`Gate::release`] is called or the gate
/// is dropped.
#[derive(Debug)]
pub struct Gate {
    sender: watch::Sender<bool>,
}

impl Gate {
    pub fn release(&self) {
        self.sender.send_replace(true);
    }
}

#[derive(Default)]
struct Route {
    queued: VecDeque<AuthResult<RawResponse>>,
    fallback: Option<Responder>,
    gate: Option<watch::Receiver<bool>>,
}

/// Deterministic [`HttpTransport`] for tests
///
/// # Examples
///
/// ```
/// use authrelay_client::http::{HttpTransport, RawResponse, RequestEnvelope};
/// use authrelay_client::testing::ScriptedTransport;
///
/// # tokio_test::block_on(async {
/// let transport = ScriptedTransport::new();
/// transport.push_response("/api/2/me", RawResponse::new(200, r#"{"id":1}"#));
///
/// let request = RequestEnvelope::get("https://id.example.com/api/2/me").into_http_request("ua");
/// let response = transport.send(request).await.unwrap();
/// assert_eq!(response.status, 200);
/// assert_eq!(transport.request_count("/api/2/me"), 1);
/// # });
/// ```
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("routes", &self.routes.lock().keys().cloned().collect::<Vec<_>>())
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl ScriptedTransport {
    /// Create a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for `path`.
    pub fn push_response(&self, path: &str, response: RawResponse) {
        self.routes.lock().entry(path.to_string()).or_default().queued.push_back(Ok(response));
    }

    /// Queue a one-shot transport failure for `path`.
    pub fn push_error(&self, path: &str, error: AuthError) {
        self.routes.lock().entry(path.to_string()).or_default().queued.push_back(Err(error));
    }

    /// Answer every request to `path` with `responder` once its queue is
    /// empty.
    pub fn respond_with<F>(&self, path: &str, responder: F)
    where
        F: Fn(&HttpRequest) -> AuthResult<RawResponse> + Send + Sync + 'static,
    {
        self.routes.lock().entry(path.to_string()).or_default().fallback = Some(Arc::new(responder));
    }

    /// Answer requests to `path` by the bearer token they carry: `accepted`
    /// gets `ok`, anything else gets a 401 `expired_token`.
    pub fn accept_bearer(&self, path: &str, accepted: &str, ok: RawResponse) {
        let accepted = accepted.to_string();
        self.respond_with(path, move |request| {
            let bearer = request
                .query_value(OAUTH_TOKEN_PARAM)
                .or_else(|| request.form_value(OAUTH_TOKEN_PARAM).map(str::to_string));
            if bearer.as_deref() == Some(accepted.as_str()) {
                Ok(ok.clone())
            } else {
                Ok(RawResponse::new(401, r#"{"error":"expired_token","error_code":401}"#))
            }
        });
    }

    /// Suspend requests to `path` until the returned gate is released.
    #[must_use]
    pub fn hold(&self, path: &str) -> Gate {
        let (sender, receiver) = watch::channel(false);
        self.routes.lock().entry(path.to_string()).or_default().gate = Some(receiver);
        Gate { sender }
    }

    /// All requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for `path`, in arrival order.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests.lock().iter().filter(|r| r.path().ends_with(path)).cloned().collect()
    }

    /// Number of requests received for `path`.
    #[must_use]
    pub fn request_count(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path().ends_with(path)).count()
    }

    /// Longest registered route that is a suffix of `path`.
    fn route_key(&self, path: &str) -> Option<String> {
        self.routes
            .lock()
            .keys()
            .filter(|key| path.ends_with(key.as_str()))
            .max_by_key(|key| key.len())
            .cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> AuthResult<RawResponse> {
        {
            let mut requests = self.requests.lock();
            let sequence = requests.len();
            requests.push(RecordedRequest { sequence, request: request.clone() });
        }

        let Some(key) = self.route_key(request.path()) else {
            return Err(AuthError::network(format!("no scripted route for {}", request.path())));
        };

        let gate = self.routes.lock().get(&key).and_then(|route| route.gate.clone());
        if let Some(mut gate) = gate {
            // A dropped gate releases its waiters.
            let _ = gate.wait_for(|open| *open).await;
        }

        let mut routes = self.routes.lock();
        let route = routes.entry(key).or_default();
        if let Some(result) = route.queued.pop_front() {
            return result;
        }
        match &route.fallback {
            Some(responder) => responder(&request),
            None => Err(AuthError::network(format!(
                "scripted responses exhausted for {}",
                request.path()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::mocks.
    use std::time::Duration;

    use super::*;
    use crate::http::RequestEnvelope;

    fn get(url: &str) -> HttpRequest {
        RequestEnvelope::get(url).into_http_request("ua")
    }

    /// Validates that queued responses are served before the fallback.
    #[tokio::test]
    async fn queue_then_fallback() {
        let transport = ScriptedTransport::new();
        transport.push_response("/me", RawResponse::new(500, ""));
        transport.respond_with("/me", |_| Ok(RawResponse::new(200, "{}")));

        assert_eq!(transport.send(get("https://x/api/me")).await.unwrap().status, 500);
        assert_eq!(transport.send(get("https://x/api/me")).await.unwrap().status, 200);
        assert_eq!(transport.send(get("https://x/api/me")).await.unwrap().status, 200);
        assert_eq!(transport.request_count("/me"), 3);
    }

    /// Validates that unknown routes fail with a network error.
    #[tokio::test]
    async fn unknown_route_is_network_error() {
        let transport = ScriptedTransport::new();
        let err = transport.send(get("https://x/nowhere")).await.unwrap_err();
        assert!(matches!(err, AuthError::Network { .. }));
        assert_eq!(transport.requests().len(), 1);
    }

    /// Validates that a held route waits for release.
    #[tokio::test]
    async fn gate_holds_until_released() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response("/token", RawResponse::new(200, "{}"));
        let gate = transport.hold("/token");

        let pending = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.send(get("https://x/token")).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pending.is_finished());
        assert_eq!(transport.request_count("/token"), 1);

        gate.release();
        assert_eq!(pending.await.unwrap().unwrap().status, 200);
    }

    /// Validates bearer-based answers.
    #[tokio::test]
    async fn accept_bearer_route() {
        let transport = ScriptedTransport::new();
        transport.accept_bearer("/me", "new", RawResponse::new(200, r#"{"ok":true}"#));

        let stale = RequestEnvelope::get("https://x/me").with_bearer("old").into_http_request("ua");
        let fresh = RequestEnvelope::get("https://x/me").with_bearer("new").into_http_request("ua");

        assert_eq!(transport.send(stale).await.unwrap().status, 401);
        assert_eq!(transport.send(fresh).await.unwrap().status, 200);
        assert_eq!(transport.requests()[1].bearer().as_deref(), Some("new"));
    }
}
