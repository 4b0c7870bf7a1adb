//! Refresh coordinator
//!
//! Owns the current access token, the waiting queue and the refresh state
//! machine. Authorized requests run as independent tasks; their outcomes are
//! funnelled back into a single critical section that decides between
//! delivering the result, queueing a retry behind a refresh, or failing
//! terminally.
//!
//! ## State machine
//!
//! ```text
//!            token rejected, retry budget left
//!   Idle ─────────────────────────────────────────► Refreshing
//!    ▲        (enqueue retry copy, start exchange)      │
//!    │                                                  │ token rejected:
//!    │   exchange ok: store token, persist, drain FIFO  │ enqueue only
//!    └──────────────────────────────────────────────────┘
//!        exchange failed: fail every queued request
//! ```
//!
//! `RefreshState` and the waiting queue live under one mutex and are only
//! ever read or written together. The token is held separately as an
//! `Arc` snapshot that is replaced wholesale.
//!
//! A drained queue is replayed by a single task that starts every replay in
//! queue order, so sends reach the transport in FIFO order regardless of the
//! runtime flavor.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::credential_store::CredentialStore;
use super::token_exchange::{Grant, TokenExchange};
use super::types::AccessToken;
use crate::config::ClientConfig;
use crate::error::{AuthError, AuthResult, ErrorClassification, ErrorDetails, ErrorSeverity};
use crate::http::response::codes;
use crate::http::{send_cancellable, HttpTransport, RequestEnvelope, ResponseEnvelope};
use crate::storage::SecureStore;

type Completion = oneshot::Sender<AuthResult<ResponseEnvelope>>;
type ExchangeWaiter = oneshot::Sender<AuthResult<Arc<AccessToken>>>;

/// Whether a token exchange is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Envelope suspended until the pending exchange resolves.
struct Waiting {
    envelope: RequestEnvelope,
    completion: Completion,
}

struct CoordinatorState {
    refresh: RefreshState,
    queue: VecDeque<Waiting>,
    exchange_waiters: Vec<ExchangeWaiter>,
}

struct Inner<T: HttpTransport, S: SecureStore> {
    config: Arc<ClientConfig>,
    transport: Arc<T>,
    exchange: TokenExchange<T>,
    credentials: CredentialStore<S>,
    token: RwLock<Option<Arc<AccessToken>>>,
    state: Mutex<CoordinatorState>,
    persist_failure: Mutex<Option<AuthError>>,
}

/// Result of a submitted authorized request.
///
/// Resolves exactly once, either directly or after the request was replayed
/// behind a token refresh.
#[must_use = "dropping a PendingResponse discards the request's result"]
pub struct PendingResponse {
    receiver: oneshot::Receiver<AuthResult<ResponseEnvelope>>,
}

impl Future for PendingResponse {
    type Output = AuthResult<ResponseEnvelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(aborted())))
    }
}

/// Coordinates authorized requests and token refreshes for one client
///
/// Cheap to clone; clones share the same token, queue and state.
///
/// # Examples
///
/// ```no_run
/// use authrelay_client::auth::RefreshCoordinator;
/// use authrelay_client::config::ClientConfig;
/// use authrelay_client::http::RequestEnvelope;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder("https://id.example.com", "client", "secret", "myapp")
///     .device_id("device-1")
///     .build()?;
/// let coordinator = RefreshCoordinator::with_keychain(config)?;
/// coordinator.restore()?;
///
/// let me = RequestEnvelope::get(coordinator.config().api_url("me")).max_retry_count(1);
/// let response = coordinator.execute_authorized(me).await?;
/// println!("{}", response.json);
/// # Ok(())
/// # }
/// ```
pub struct RefreshCoordinator<T: HttpTransport, S: SecureStore> {
    inner: Arc<Inner<T, S>>,
}

impl<T: HttpTransport, S: SecureStore> Clone for RefreshCoordinator<T, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: HttpTransport, S: SecureStore> fmt::Debug for RefreshCoordinator<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("client_id", &self.inner.config.client_id)
            .field("refresh_state", &state.refresh)
            .field("pending_requests", &state.queue.len())
            .field("has_token", &self.inner.token.read().is_some())
            .finish()
    }
}

#[cfg(feature = "keychain")]
impl RefreshCoordinator<crate::http::ReqwestTransport, crate::storage::KeychainStore> {
    /// Coordinator over `reqwest` and the platform keychain.
    ///
    /// # Errors
    /// Returns `AuthError::Network` if the HTTP client cannot be built.
    pub fn with_keychain(config: ClientConfig) -> AuthResult<Self> {
        let transport = crate::http::ReqwestTransport::new(config.request_timeout)?;
        let store = crate::storage::KeychainStore::new(&config.storage_namespace);
        Ok(Self::new(config, transport, store))
    }
}

impl<T: HttpTransport, S: SecureStore> RefreshCoordinator<T, S> {
    /// Create a coordinator with no token loaded.
    pub fn new(config: ClientConfig, transport: T, store: S) -> Self {
        Self::from_shared(Arc::new(config), Arc::new(transport), Arc::new(store))
    }

    /// Create a coordinator over already shared parts.
    pub fn from_shared(config: Arc<ClientConfig>, transport: Arc<T>, store: Arc<S>) -> Self {
        let credentials = CredentialStore::new(store, config.device_id.clone(), config.kdf);
        let exchange = TokenExchange::new(Arc::clone(&transport), Arc::clone(&config));

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                exchange,
                credentials,
                token: RwLock::new(None),
                state: Mutex::new(CoordinatorState {
                    refresh: RefreshState::Idle,
                    queue: VecDeque::new(),
                    exchange_waiters: Vec::new(),
                }),
                persist_failure: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Load the persisted token into memory.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the persisted record is unreadable; the
    /// store has been cleared by then.
    pub fn restore(&self) -> AuthResult<Option<Arc<AccessToken>>> {
        let loaded = self.inner.credentials.load(&self.inner.config.client_secret)?;
        let token = loaded.map(Arc::new);
        if let Some(token) = &token {
            info!(user_id = %token.user_id, "Restored persisted access token");
        }
        self.inner.token.write().clone_from(&token);
        Ok(token)
    }

    /// Snapshot of the current token.
    #[must_use]
    pub fn access_token(&self) -> Option<Arc<AccessToken>> {
        self.inner.token.read().clone()
    }

    /// Replace the current token and persist it.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if persisting fails. The in-memory token
    /// is replaced regardless.
    pub fn set_access_token(&self, token: AccessToken) -> AuthResult<()> {
        let token = Arc::new(token);
        *self.inner.token.write() = Some(Arc::clone(&token));
        self.inner.credentials.save(&token, &self.inner.config.client_secret)
    }

    /// Forget the token in memory and in the store.
    pub fn logout(&self) {
        info!("Logging out, clearing access token");
        self.clear_credentials();
    }

    #[must_use]
    pub fn refresh_state(&self) -> RefreshState {
        self.inner.state.lock().refresh
    }

    /// Take the error of the last failed attempt to persist a refreshed token.
    ///
    /// Waiting requests are replayed with the in-memory token even when
    /// persisting it failed, so the failure is kept here until taken or until
    /// a later exchange persists successfully.
    pub fn take_persist_failure(&self) -> Option<AuthError> {
        self.inner.persist_failure.lock().take()
    }

    /// Number of requests waiting for the pending exchange.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Run a request without a bearer token or refresh handling.
    ///
    /// # Errors
    /// Returns the classified error of the response or a network error.
    pub async fn execute(&self, envelope: RequestEnvelope) -> AuthResult<ResponseEnvelope> {
        let cancellation = envelope.cancellation().cloned();
        let request = envelope.into_http_request(&self.inner.config.user_agent);
        let raw =
            send_cancellable(self.inner.transport.as_ref(), request, cancellation.as_ref()).await?;
        let response = self.classify(raw);
        match response.error {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    /// Run a request with the current bearer token attached.
    ///
    /// # Errors
    /// Returns the final classified error after any refresh-and-replay
    /// rounds the envelope's retry budget allows.
    pub async fn execute_authorized(
        &self,
        envelope: RequestEnvelope,
    ) -> AuthResult<ResponseEnvelope> {
        self.submit(envelope).await
    }

    /// Start an authorized request and return its pending result.
    ///
    /// The request is dispatched before this returns, so submission order is
    /// the order of calls.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn submit(&self, envelope: RequestEnvelope) -> PendingResponse {
        let (completion, receiver) = oneshot::channel();
        self.dispatch(envelope, completion);
        PendingResponse { receiver }
    }

    /// Exchange an authorization code for a token.
    ///
    /// On success the token is stored, persisted, and any waiting requests
    /// are replayed.
    ///
    /// # Errors
    /// Returns `AuthError::Protocol` (`exchange_in_progress`) while another
    /// exchange is running, the exchange's classified error, or
    /// `AuthError::Storage` if the new token could not be persisted.
    pub async fn authorize_with_code(&self, code: &str) -> AuthResult<Arc<AccessToken>> {
        let (waiter, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if state.refresh == RefreshState::Refreshing {
                return Err(AuthError::Protocol(ErrorDetails::new(
                    "exchange_in_progress",
                    "a token exchange is already running",
                )));
            }
            state.refresh = RefreshState::Refreshing;
            state.exchange_waiters.push(waiter);
        }

        self.spawn_exchange(Some(Grant::AuthorizationCode { code: code.to_string() }));
        receiver.await.unwrap_or_else(|_| Err(aborted()))
    }

    /// Refresh the token now, or join the refresh already in flight.
    ///
    /// # Errors
    /// Returns the exchange's error, or `AuthError::Storage` if the new
    /// token could not be persisted.
    pub async fn refresh_now(&self) -> AuthResult<Arc<AccessToken>> {
        let (waiter, receiver) = oneshot::channel();
        let start = {
            let mut state = self.inner.state.lock();
            state.exchange_waiters.push(waiter);
            self.begin_refresh(&mut state)
        };
        if start {
            self.spawn_refresh();
        }
        receiver.await.unwrap_or_else(|_| Err(aborted()))
    }

    fn dispatch(&self, envelope: RequestEnvelope, completion: Completion) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_authorized(envelope, completion).await;
        });
    }

    async fn run_authorized(&self, envelope: RequestEnvelope, completion: Completion) {
        let outgoing = match self.access_token() {
            Some(token) => envelope.clone().with_bearer(&token.access_token),
            None => envelope.clone(),
        };
        debug!(
            method = %envelope.method(),
            url = %envelope.url(),
            retry_count = envelope.retry_count(),
            "Executing authorized request"
        );

        let request = outgoing.into_http_request(&self.inner.config.user_agent);
        let raw = match send_cancellable(
            self.inner.transport.as_ref(),
            request,
            envelope.cancellation(),
        )
        .await
        {
            Ok(raw) => raw,
            Err(err) => {
                log_rejection(envelope.url(), &err);
                let _ = completion.send(Err(err));
                return;
            }
        };

        let mut response = self.classify(raw);
        match response.error.take() {
            None => {
                let _ = completion.send(Ok(response));
            }
            Some(err) if err.triggers_refresh() => {
                self.on_token_rejected(envelope, completion, err);
            }
            Some(err) => {
                log_rejection(envelope.url(), &err);
                let _ = completion.send(Err(err));
            }
        }
    }

    fn on_token_rejected(&self, envelope: RequestEnvelope, completion: Completion, err: AuthError) {
        if !envelope.can_retry() {
            warn!(
                url = %envelope.url(),
                retry_count = envelope.retry_count(),
                error = %err,
                "Access token rejected and retries exhausted, clearing credentials"
            );
            self.clear_credentials();
            let _ = completion.send(Err(err));
            return;
        }

        let retry = envelope.retry_copy();
        let start = {
            let mut state = self.inner.state.lock();
            debug!(
                url = %retry.url(),
                retry_count = retry.retry_count(),
                queued = state.queue.len() + 1,
                "Access token rejected, queueing request for replay"
            );
            state.queue.push_back(Waiting { envelope: retry, completion });
            self.begin_refresh(&mut state)
        };

        if start {
            self.spawn_refresh();
        }
    }

    /// Move to `Refreshing` if idle. Returns whether the caller must start
    /// the exchange.
    fn begin_refresh(&self, state: &mut CoordinatorState) -> bool {
        match state.refresh {
            RefreshState::Idle => {
                state.refresh = RefreshState::Refreshing;
                true
            }
            RefreshState::Refreshing => false,
        }
    }

    fn spawn_refresh(&self) {
        let grant = self
            .access_token()
            .filter(|token| token.has_refresh_token())
            .map(|token| Grant::RefreshToken { refresh_token: token.refresh_token.clone() });
        self.spawn_exchange(grant);
    }

    /// Run the exchange on its own task and resolve it on another, so a
    /// panicking exchange still returns the state to `Idle`.
    fn spawn_exchange(&self, grant: Option<Grant>) {
        let worker = self.clone();
        let exchange = tokio::spawn(async move {
            match grant {
                Some(grant) => {
                    info!(grant_type = grant.grant_type(), "Starting token exchange");
                    worker.inner.exchange.exchange(&grant).await
                }
                None => Err(AuthError::OAuth(ErrorDetails::new(
                    codes::INVALID_GRANT,
                    "no refresh token available",
                ))),
            }
        });

        let this = self.clone();
        tokio::spawn(async move {
            let result = exchange.await.unwrap_or_else(|join_err| {
                error!(error = %join_err, "Token exchange task aborted");
                Err(AuthError::protocol("exchange_aborted", join_err.to_string()))
            });
            this.complete_exchange(result);
        });
    }

    fn complete_exchange(&self, result: AuthResult<AccessToken>) {
        match result {
            Ok(token) => {
                let token = Arc::new(token);
                *self.inner.token.write() = Some(Arc::clone(&token));

                let persisted =
                    self.inner.credentials.save(&token, &self.inner.config.client_secret);
                if let Err(err) = &persisted {
                    error!(error = %err, "Failed to persist refreshed access token");
                }
                *self.inner.persist_failure.lock() = persisted.clone().err();

                let (drained, waiters) = self.finish_exchange();
                info!(user_id = %token.user_id, replayed = drained.len(), "Token exchange succeeded");

                self.replay(drained);
                for waiter in waiters {
                    let _ = waiter.send(persisted.clone().map(|()| Arc::clone(&token)));
                }
            }
            Err(err) => {
                let (drained, waiters) = self.finish_exchange();
                warn!(error = %err, failed = drained.len(), "Token exchange failed");

                for waiting in drained {
                    let _ = waiting.completion.send(Err(err.clone()));
                }
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    /// Replay drained requests from one task, starting each in queue order.
    fn replay(&self, drained: VecDeque<Waiting>) {
        if drained.is_empty() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let replays = drained
                .into_iter()
                .map(|waiting| this.run_authorized(waiting.envelope, waiting.completion));
            join_all(replays).await;
        });
    }

    /// Return to `Idle` and take the queue in one step.
    fn finish_exchange(&self) -> (VecDeque<Waiting>, Vec<ExchangeWaiter>) {
        let mut state = self.inner.state.lock();
        state.refresh = RefreshState::Idle;
        (std::mem::take(&mut state.queue), std::mem::take(&mut state.exchange_waiters))
    }

    fn clear_credentials(&self) {
        *self.inner.token.write() = None;
        self.inner.credentials.clear();
    }

    fn classify(&self, raw: crate::http::RawResponse) -> ResponseEnvelope {
        let response = ResponseEnvelope::from_raw(raw);
        if self.inner.config.debug_mode {
            debug!(status = response.status_code, body = %response.body, "Response received");
        }
        response
    }
}

fn log_rejection(url: &str, err: &AuthError) {
    match err.severity() {
        ErrorSeverity::Info => {
            debug!(url = %url, kind = err.kind(), error = %err, "Authorized request rejected");
        }
        ErrorSeverity::Warning => {
            warn!(url = %url, kind = err.kind(), error = %err, "Authorized request rejected");
        }
        ErrorSeverity::Error | ErrorSeverity::Critical => {
            error!(url = %url, kind = err.kind(), error = %err, "Authorized request rejected");
        }
    }
}

fn aborted() -> AuthError {
    AuthError::protocol("request_aborted", "completion dropped before a result was delivered")
}
