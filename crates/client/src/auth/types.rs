//! Token types
//!
//! [`AccessToken`] is the immutable credential owned by the coordinator.
//! [`TokenResponse`] is the wire shape returned by the token endpoint.

use std::fmt;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AuthError;

/// OAuth access token with its refresh token and owning user
///
/// Values are never mutated in place: a refresh produces a new `AccessToken`
/// that replaces the previous one wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque bearer credential presented on API calls
    pub access_token: String,

    /// Absolute expiry (UTC)
    pub expires_at: DateTime<Utc>,

    /// Credential used to mint a new access token, empty if none was issued
    pub refresh_token: String,

    /// Identifier of the user the token belongs to
    pub user_id: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl AccessToken {
    /// Create a token expiring `expires_in_seconds` from now.
    ///
    /// Offsets beyond the representable range saturate to the latest (or
    /// earliest) representable instant.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        expires_in_seconds: i64,
        refresh_token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let saturated =
            if expires_in_seconds < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC };
        Self {
            access_token: access_token.into(),
            expires_at: expiry_from_now(expires_in_seconds).unwrap_or(saturated),
            refresh_token: refresh_token.into(),
            user_id: user_id.into(),
        }
    }

    /// Seconds until expiry (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }

    /// Whether a refresh token was issued.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Expiry as epoch milliseconds, the persisted representation.
    #[must_use]
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }

    /// Parse an epoch-millisecond string back into a timestamp.
    pub fn parse_expires_at_millis(raw: &str) -> Option<DateTime<Utc>> {
        raw.trim().parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Successful token endpoint body.
///
/// The provider reports expiry either relative (`expires_in`, seconds) or
/// absolute (`expires_at`, epoch seconds). `user_id` may be a string or a
/// number.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
}

impl TryFrom<TokenResponse> for AccessToken {
    type Error = AuthError;

    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        let expires_at = match (response.expires_at, response.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single().ok_or_else(|| {
                AuthError::InvalidResponse { body: format!("invalid expires_at: {at}") }
            })?,
            (None, Some(seconds)) => expiry_from_now(seconds).ok_or_else(|| {
                AuthError::InvalidResponse { body: format!("invalid expires_in: {seconds}") }
            })?,
            (None, None) => {
                return Err(AuthError::InvalidResponse {
                    body: "token response is missing expires_in/expires_at".to_string(),
                })
            }
        };

        Ok(Self {
            access_token: response.access_token,
            expires_at,
            refresh_token: response.refresh_token.unwrap_or_default(),
            user_id: response.user_id.unwrap_or_default(),
        })
    }
}

/// `now + seconds`, or `None` when the result is not representable.
fn expiry_from_now(seconds: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds).and_then(|delta| Utc::now().checked_add_signed(delta))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
