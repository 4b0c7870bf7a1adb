//! Request envelope
//!
//! A [`RequestEnvelope`] is a plain value describing one HTTP call plus its
//! retry bookkeeping. Executing consumes it, so an envelope runs at most
//! once; a retry is a fresh value from [`RequestEnvelope::retry_copy`].

use std::collections::BTreeMap;
use std::fmt;

use tokio_util::sync::CancellationToken;

/// Name of the query parameter / form field carrying the bearer token.
pub const OAUTH_TOKEN_PARAM: &str = "oauth_token";

/// Retries allowed unless the caller raises the bound.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 0;

/// HTTP methods supported by the provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Wire-ready request handed to an [`HttpTransport`](super::HttpTransport).
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form fields, empty for GET
    pub form: Vec<(String, String)>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &redact_url(&self.url))
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("form", &self.form.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

impl HttpRequest {
    /// Value of a form field, if present.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Value of a header (case-insensitive name), if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Decoded value of a query parameter in the URL, if present.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let k = urlencoding::decode(k).ok()?;
            if k == key {
                urlencoding::decode(v).ok().map(|v| v.into_owned())
            } else {
                None
            }
        })
    }

    /// The URL without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(base, _)| base)
    }
}

/// Single-use description of one HTTP call plus retry bookkeeping.
#[derive(Clone)]
pub struct RequestEnvelope {
    method: HttpMethod,
    url: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    body: BTreeMap<String, String>,
    retry_count: u32,
    max_retry_count: u32,
    cancellation: Option<CancellationToken>,
}

impl fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("query", &self.query.keys().collect::<Vec<_>>())
            .field("body", &self.body.keys().collect::<Vec<_>>())
            .field("retry_count", &self.retry_count)
            .field("max_retry_count", &self.max_retry_count)
            .finish()
    }
}

impl RequestEnvelope {
    /// Create an envelope for `method` and `url` with no parameters.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: BTreeMap::new(),
            retry_count: 0,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            cancellation: None,
        }
    }

    /// Create a GET envelope
    ///
    /// # Examples
    /// ```
    /// use authrelay_client::http::RequestEnvelope;
    ///
    /// let envelope = RequestEnvelope::get("https://id.example.com/api/2/me")
    ///     .query("fields", "name,email")
    ///     .max_retry_count(1);
    /// assert_eq!(
    ///     envelope.complete_url(),
    ///     "https://id.example.com/api/2/me?fields=name%2Cemail"
    /// );
    /// ```
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create a POST envelope.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Add a query parameter; the last value for a key wins.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a form body field; the last value for a key wins.
    #[must_use]
    pub fn body(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Add a header; the last value for a name wins.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Bound the number of token-refresh retries for this request.
    #[must_use]
    pub fn max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    /// Abort the call when `token` is cancelled.
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_limit(&self) -> u32 {
        self.max_retry_count
    }

    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn body_params(&self) -> &BTreeMap<String, String> {
        &self.body
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Whether another refresh-and-replay round is allowed.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retry_count
    }

    /// Copy carrying the same parameters with `retry_count + 1`.
    #[must_use]
    pub fn retry_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.retry_count += 1;
        copy
    }

    /// Base URL followed by the encoded query string.
    #[must_use]
    pub fn complete_url(&self) -> String {
        format!("{}{}", self.url, build_query_string(&self.query))
    }

    /// Whether a bearer token is already present on the request.
    #[must_use]
    pub fn has_bearer(&self) -> bool {
        match self.method {
            HttpMethod::Get => {
                self.query.contains_key(OAUTH_TOKEN_PARAM) || self.url.contains(OAUTH_TOKEN_PARAM)
            }
            HttpMethod::Post => self.body.contains_key(OAUTH_TOKEN_PARAM),
        }
    }

    /// Attach `access_token` as query parameter (GET) or form field (POST)
    /// unless the caller already supplied one.
    #[must_use]
    pub fn with_bearer(self, access_token: &str) -> Self {
        if self.has_bearer() {
            return self;
        }
        match self.method {
            HttpMethod::Get => self.query(OAUTH_TOKEN_PARAM, access_token),
            HttpMethod::Post => self.body(OAUTH_TOKEN_PARAM, access_token),
        }
    }

    /// Produce the wire request, always carrying a `User-Agent` header.
    #[must_use]
    pub fn into_http_request(self, user_agent: &str) -> HttpRequest {
        let url = self.complete_url();

        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
            headers.push(("User-Agent".to_string(), user_agent.to_string()));
        }
        headers.extend(self.headers);

        let form = match self.method {
            HttpMethod::Get => Vec::new(),
            HttpMethod::Post => self.body.into_iter().collect(),
        };

        HttpRequest { method: self.method, url, headers, form }
    }
}

/// Build `?k1=v1&k2=v2` from a parameter map, empty when there are none.
///
/// Keys and values are percent-encoded individually. Rust strings are always
/// valid UTF-8, so encoding is total and the raw pair is never needed.
#[must_use]
pub fn build_query_string(params: &BTreeMap<String, String>) -> String {
    let mut query = String::new();
    for (key, value) in params {
        query.push(if query.is_empty() { '?' } else { '&' });
        query.push_str(&encode_pair(key, value));
    }
    query
}

fn encode_pair(key: &str, value: &str) -> String {
    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
}

fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?[..]"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for http::envelope.
    use super::*;

    /// Validates deterministic query serialization with reserved characters.
    #[test]
    fn query_string_is_encoded_and_ordered() {
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "x y".to_string());
        params.insert("a".to_string(), "1".to_string());

        assert_eq!(build_query_string(&params), "?a=1&b=x%20y");
    }

    /// Validates that keys are encoded as well as values.
    #[test]
    fn query_keys_are_encoded() {
        let mut params = BTreeMap::new();
        params.insert("redirect uri".to_string(), "app://login?x=1&y=2".to_string());

        assert_eq!(
            build_query_string(&params),
            "?redirect%20uri=app%3A%2F%2Flogin%3Fx%3D1%26y%3D2"
        );
    }

    /// Validates that an empty map yields an empty query string.
    #[test]
    fn empty_query_string() {
        assert_eq!(build_query_string(&BTreeMap::new()), "");
        assert_eq!(RequestEnvelope::get("https://x/api").complete_url(), "https://x/api");
    }

    /// Validates last-write-wins map semantics.
    #[test]
    fn last_write_wins() {
        let envelope = RequestEnvelope::post("https://x/api")
            .body("name", "first")
            .body("name", "second")
            .header("Accept", "text/plain")
            .header("Accept", "application/json");

        assert_eq!(envelope.body_params().get("name").map(String::as_str), Some("second"));
        let request = envelope.into_http_request("ua/1");
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    /// Validates that retry copies keep parameters and bump the counter.
    #[test]
    fn retry_copy_increments_counter() {
        let envelope = RequestEnvelope::get("https://x/api").query("id", "7").max_retry_count(2);
        assert!(envelope.can_retry());

        let first = envelope.retry_copy();
        assert_eq!(first.retry_count(), 1);
        assert_eq!(first.query_params(), envelope.query_params());
        assert_eq!(envelope.retry_count(), 0);

        let second = first.retry_copy();
        assert_eq!(second.retry_count(), 2);
        assert!(!second.can_retry());
    }

    /// Validates the default retry bound.
    #[test]
    fn default_max_retry_count_is_zero() {
        let envelope = RequestEnvelope::get("https://x/api");
        assert_eq!(envelope.retry_limit(), DEFAULT_MAX_RETRY_COUNT);
        assert!(!envelope.can_retry());
    }

    /// Validates bearer injection for GET and POST.
    #[test]
    fn bearer_injection_by_method() {
        let get = RequestEnvelope::get("https://x/api").with_bearer("tok").into_http_request("ua");
        assert_eq!(get.query_value(OAUTH_TOKEN_PARAM).as_deref(), Some("tok"));
        assert!(get.form.is_empty());

        let post = RequestEnvelope::post("https://x/api").with_bearer("tok").into_http_request("ua");
        assert_eq!(post.form_value(OAUTH_TOKEN_PARAM), Some("tok"));
        assert_eq!(post.url, "https://x/api");
    }

    /// Validates that a caller-supplied bearer is never overwritten.
    #[test]
    fn caller_supplied_bearer_is_kept() {
        let get = RequestEnvelope::get("https://x/api?oauth_token=mine").with_bearer("tok");
        assert!(!get.query_params().contains_key(OAUTH_TOKEN_PARAM));

        let post = RequestEnvelope::post("https://x/api").body(OAUTH_TOKEN_PARAM, "mine");
        let post = post.with_bearer("tok").into_http_request("ua");
        assert_eq!(post.form_value(OAUTH_TOKEN_PARAM), Some("mine"));
    }

    /// Validates that User-Agent is always attached.
    #[test]
    fn user_agent_always_attached() {
        let request = RequestEnvelope::get("https://x/api").into_http_request("app/1.0");
        assert_eq!(request.header("User-Agent"), Some("app/1.0"));

        let request = RequestEnvelope::get("https://x/api")
            .header("user-agent", "custom")
            .into_http_request("app/1.0");
        assert_eq!(request.header("User-Agent"), Some("custom"));
        assert_eq!(request.headers.len(), 1);
    }

    /// Validates that debug output does not leak parameter values.
    #[test]
    fn debug_hides_values() {
        let envelope = RequestEnvelope::post("https://x/token").body("client_secret", "hunter2");
        assert!(!format!("{envelope:?}").contains("hunter2"));

        let request = envelope.into_http_request("ua");
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
