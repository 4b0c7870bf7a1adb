//! Error taxonomy for authenticated calls
//!
//! Every failure produced by this crate resolves into one [`AuthError`]. The
//! enum is closed: the refresh coordinator, the token exchange and callers all
//! decide what to do with an error by matching on its variant.
//!
//! # Error Handling Architecture
//!
//! 1. **`AuthError`**: ten kinds, one per failure class. Server-reported kinds
//!    carry the decoded [`ErrorDetails`] record.
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by severity and by whether they should drive a token refresh.
//! 3. **`ErrorSeverity` enum**: severity levels the coordinator logs at.
//!
//! ## Policy per kind
//!
//! | Kind | Coordinator action |
//! |------|--------------------|
//! | `Network` | Surfaced immediately, never auto-retried |
//! | `InvalidToken` / `ExpiredToken` | Bounded retry-and-refresh |
//! | `UnknownUser`, `UnverifiedUser`, `OAuth`, `Api`, `Protocol`, `InvalidResponse` | Surfaced, not retried |
//! | `Storage` | Store cleared, then surfaced |

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Standard result type using [`AuthError`]
pub type AuthResult<T> = Result<T, AuthError>;

/// Error code used when the server did not report a parseable one.
pub const UNKNOWN_CODE: i64 = -1;

/// Key under which the primary human readable description is stored.
pub const PRIMARY_DESCRIPTION: &str = "error";

/// Server-reported error record decoded from a response body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorDetails {
    /// Machine readable error string, e.g. `expired_token`
    pub error: String,
    /// Numeric error code, [`UNKNOWN_CODE`] if absent or unparseable
    pub error_code: i64,
    /// Error family reported by the server, e.g. `OAuthException`
    pub error_type: Option<String>,
    /// Human readable descriptions keyed by field name
    pub descriptions: BTreeMap<String, String>,
}

impl ErrorDetails {
    /// Create a record with a single primary description.
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        let mut descriptions = BTreeMap::new();
        descriptions.insert(PRIMARY_DESCRIPTION.to_string(), description.into());
        Self { error: error.into(), error_code: UNKNOWN_CODE, error_type: None, descriptions }
    }

    /// Set the error code (fluent API)
    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.error_code = code;
        self
    }

    /// Set the error type (fluent API)
    #[must_use]
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// The primary description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.descriptions.get(PRIMARY_DESCRIPTION).map(String::as_str)
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) if !desc.is_empty() => write!(f, "{}: {}", self.error, desc),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// Closed set of failure kinds consumed by the refresh coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// I/O failure, timeout or cancellation of the HTTP call
    #[error("network error: {message}")]
    Network { message: String, cancelled: bool },

    /// Non-empty body that is not valid JSON
    #[error("invalid response from server: {body}")]
    InvalidResponse { body: String },

    /// Access token rejected as invalid
    #[error("invalid access token: {0}")]
    InvalidToken(ErrorDetails),

    /// Access token rejected as expired
    #[error("expired access token: {0}")]
    ExpiredToken(ErrorDetails),

    /// User is not known to the provider
    #[error("unknown user: {0}")]
    UnknownUser(ErrorDetails),

    /// User exists but has not been verified
    #[error("unverified user: {0}")]
    UnverifiedUser(ErrorDetails),

    /// OAuth protocol error reported by the provider
    #[error("oauth error: {0}")]
    OAuth(ErrorDetails),

    /// API error reported by the provider
    #[error("api error: {0}")]
    Api(ErrorDetails),

    /// Any other provider error
    #[error("protocol error: {0}")]
    Protocol(ErrorDetails),

    /// Credential persistence or decryption failure
    #[error("storage error during '{operation}': {message}")]
    Storage { message: String, operation: String },
}

impl AuthError {
    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network { message: message.into(), cancelled: false }
    }

    /// Create the network error reported for a cancelled call
    pub fn cancelled() -> Self {
        Self::Network { message: "request cancelled".to_string(), cancelled: true }
    }

    /// Create a storage error for a specific operation
    pub fn storage<O: Into<String>, S: Into<String>>(operation: O, message: S) -> Self {
        Self::Storage { message: message.into(), operation: operation.into() }
    }

    /// Create a generic protocol error
    pub fn protocol<E: Into<String>, S: Into<String>>(error: E, description: S) -> Self {
        Self::Protocol(ErrorDetails::new(error, description))
    }

    /// Server-reported details, if this kind carries them
    #[must_use]
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::InvalidToken(d)
            | Self::ExpiredToken(d)
            | Self::UnknownUser(d)
            | Self::UnverifiedUser(d)
            | Self::OAuth(d)
            | Self::Api(d)
            | Self::Protocol(d) => Some(d),
            Self::Network { .. } | Self::InvalidResponse { .. } | Self::Storage { .. } => None,
        }
    }

    /// Numeric error code, [`UNKNOWN_CODE`] for kinds without one
    #[must_use]
    pub fn error_code(&self) -> i64 {
        self.details().map_or(UNKNOWN_CODE, |d| d.error_code)
    }

    /// Whether this error was produced by a cancelled call
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Network { cancelled: true, .. })
    }

    /// Short kind name used as a structured logging field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::InvalidToken(_) => "invalid_token",
            Self::ExpiredToken(_) => "expired_token",
            Self::UnknownUser(_) => "unknown_user",
            Self::UnverifiedUser(_) => "unverified_user",
            Self::OAuth(_) => "oauth",
            Self::Api(_) => "api",
            Self::Protocol(_) => "protocol",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Error classification trait for consistent error handling across modules
pub trait ErrorClassification {
    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Whether this error should drive the token refresh protocol
    fn triggers_refresh(&self) -> bool;
}

impl ErrorClassification for AuthError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network { cancelled: true, .. } => ErrorSeverity::Info,
            Self::Network { .. } => ErrorSeverity::Warning,
            Self::InvalidToken(_) | Self::ExpiredToken(_) => ErrorSeverity::Warning,
            Self::UnknownUser(_) | Self::UnverifiedUser(_) => ErrorSeverity::Info,
            Self::InvalidResponse { .. } | Self::OAuth(_) | Self::Api(_) | Self::Protocol(_) => {
                ErrorSeverity::Error
            }
            Self::Storage { .. } => ErrorSeverity::Critical,
        }
    }

    fn triggers_refresh(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::ExpiredToken(_))
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, expected conditions
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// Credential integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    /// Validates that only token rejections drive the refresh protocol.
    #[test]
    fn only_token_rejections_trigger_refresh() {
        let details = ErrorDetails::new("expired_token", "expired");
        assert!(AuthError::ExpiredToken(details.clone()).triggers_refresh());
        assert!(AuthError::InvalidToken(details.clone()).triggers_refresh());

        assert!(!AuthError::network("connection reset").triggers_refresh());
        assert!(!AuthError::OAuth(details.clone()).triggers_refresh());
        assert!(!AuthError::Api(details).triggers_refresh());
        assert!(!AuthError::storage("load", "bad tag").triggers_refresh());
    }

    /// Validates severities for network failures and cancellations.
    #[test]
    fn network_errors_are_not_refresh_triggers() {
        let err = AuthError::cancelled();
        assert!(err.is_cancelled());
        assert_eq!(err.severity(), ErrorSeverity::Info);

        let err = AuthError::network("timed out");
        assert!(!err.is_cancelled());
        assert!(!err.triggers_refresh());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.kind(), "network");
    }

    /// Validates display output of server-reported details.
    #[test]
    fn details_display_includes_description() {
        let details = ErrorDetails::new("invalid_grant", "refresh token revoked").with_code(401);
        assert_eq!(details.to_string(), "invalid_grant: refresh token revoked");
        assert_eq!(AuthError::OAuth(details).error_code(), 401);

        let bare = ErrorDetails::new("invalid_request", "");
        assert_eq!(bare.to_string(), "invalid_request");
    }

    /// Validates that storage failures are the most severe kind.
    #[test]
    fn storage_errors_are_critical() {
        let err = AuthError::storage("save", "encryption failed");
        assert_eq!(err.kind(), "storage");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.severity() > AuthError::OAuth(ErrorDetails::default()).severity());
    }

    /// Validates the error code fallback for kinds without details.
    #[test]
    fn error_code_defaults_to_unknown() {
        assert_eq!(AuthError::network("down").error_code(), UNKNOWN_CODE);
        assert_eq!(AuthError::InvalidResponse { body: "<html>".into() }.error_code(), UNKNOWN_CODE);
    }
}
