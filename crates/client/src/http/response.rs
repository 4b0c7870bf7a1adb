//! Response classification
//!
//! Turns a raw HTTP result into a [`ResponseEnvelope`] carrying either a
//! parsed body or one [`AuthError`] kind. Two error body shapes are accepted:
//!
//! ```text
//! nested: {"error": {"error": "..", "code": 400, "type": "..", "description": {..} | ".."}}
//! flat:   {"error": "..", "error_code": 400, "type": "..", "error_description": ".."}
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::transport::RawResponse;
use crate::error::{AuthError, AuthResult, ErrorDetails, PRIMARY_DESCRIPTION, UNKNOWN_CODE};

const MISSING_DESCRIPTION: &str = "Missing error description";
const MISSING_DESCRIPTION_DETAILS: &str = "Missing description details";

const API_EXCEPTION: &str = "ApiException";
const OAUTH_EXCEPTION: &str = "OAuthException";

/// Well-known `error` values reported by the provider.
pub mod codes {
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const EXPIRED_TOKEN: &str = "expired_token";
    pub const UNKNOWN_USER: &str = "unknown_user";
    pub const UNVERIFIED_USER: &str = "unverified_user";
    pub const INVALID_GRANT: &str = "invalid_grant";
    pub const INVALID_CLIENT: &str = "invalid_client";
    pub const INVALID_REQUEST: &str = "invalid_request";
}

/// Whether `status` counts as success: `[200, 400)`.
#[must_use]
pub const fn is_successful(status: u16) -> bool {
    status >= 200 && status < 400
}

/// Classified HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Parsed body; an empty object when the body was empty or unparseable
    pub json: Value,
    pub error: Option<AuthError>,
}

impl ResponseEnvelope {
    /// Classify a raw response.
    #[must_use]
    pub fn from_raw(raw: RawResponse) -> Self {
        let RawResponse { status, headers, body } = raw;

        let (json, mut error) = if body.trim().is_empty() {
            (empty_object(), None)
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(Value::Object(map)) => {
                    let error = signals_error(&map).then(|| classify_body(&map));
                    (Value::Object(map), error)
                }
                Ok(_) | Err(_) => (
                    empty_object(),
                    Some(AuthError::InvalidResponse { body: body.clone() }),
                ),
            }
        };

        if !is_successful(status) {
            let map = json.as_object().cloned().unwrap_or_default();
            error = Some(classify_body(&map));
        }

        Self { status_code: status, headers: headers.into_iter().collect(), body, json, error }
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        is_successful(self.status_code)
    }

    /// Split into the parsed body or the classified error.
    ///
    /// # Errors
    /// Returns the classified error when one was produced.
    pub fn into_result(self) -> AuthResult<Value> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.json),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// An `error` field that is absent, JSON null or the literal `"null"` means
/// no error.
fn signals_error(body: &Map<String, Value>) -> bool {
    match body.get("error") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => s != "null",
        Some(_) => true,
    }
}

/// Map a parsed body onto an [`AuthError`] kind.
///
/// Precedence: `ApiException` type, then token rejection, then unknown user,
/// then the `OAuthException` family, then a generic protocol error.
#[must_use]
pub fn classify_body(body: &Map<String, Value>) -> AuthError {
    let mut descriptions = BTreeMap::new();

    let (mut error, code, error_type) = match body.get("error") {
        Some(Value::Object(nested)) => {
            match nested.get("description") {
                Some(Value::Object(fields)) => {
                    for (key, value) in fields {
                        let text = opt_string(Some(value));
                        let text = if text.is_empty() {
                            MISSING_DESCRIPTION_DETAILS.to_string()
                        } else {
                            text
                        };
                        descriptions.insert(key.clone(), text);
                    }
                }
                other => {
                    descriptions.insert(
                        PRIMARY_DESCRIPTION.to_string(),
                        opt_string_or(other, MISSING_DESCRIPTION),
                    );
                }
            }
            (
                opt_string(nested.get("error")),
                opt_string(nested.get("code")),
                opt_string(nested.get("type")),
            )
        }
        flat => {
            descriptions.insert(
                PRIMARY_DESCRIPTION.to_string(),
                opt_string_or(body.get("error_description"), MISSING_DESCRIPTION),
            );
            (opt_string(flat), opt_string(body.get("error_code")), opt_string(body.get("type")))
        }
    };

    if error.is_empty() && !error_type.is_empty() {
        error.clone_from(&error_type);
    }
    if descriptions.is_empty() {
        descriptions.insert(PRIMARY_DESCRIPTION.to_string(), error_type.clone());
    }

    let details = ErrorDetails {
        error,
        error_code: code.trim().parse().unwrap_or(UNKNOWN_CODE),
        error_type: (!error_type.is_empty()).then(|| error_type.clone()),
        descriptions,
    };

    if error_type == API_EXCEPTION {
        return AuthError::Api(details);
    }
    match details.error.as_str() {
        codes::INVALID_TOKEN => AuthError::InvalidToken(details),
        codes::EXPIRED_TOKEN => AuthError::ExpiredToken(details),
        codes::UNKNOWN_USER => AuthError::UnknownUser(details),
        codes::UNVERIFIED_USER if error_type == OAUTH_EXCEPTION => {
            AuthError::UnverifiedUser(details)
        }
        _ if error_type == OAUTH_EXCEPTION => AuthError::OAuth(details),
        _ => AuthError::Protocol(details),
    }
}

/// Lenient scalar-to-text conversion; absent and null become empty.
fn opt_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn opt_string_or(value: Option<&Value>, fallback: &str) -> String {
    match value {
        None | Some(Value::Null) => fallback.to_string(),
        some => opt_string(some),
    }
}
