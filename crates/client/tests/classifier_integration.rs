//! Integration tests for response classification, request serialization and
//! credential persistence through the public API.

use std::collections::BTreeMap;
use std::sync::Arc;

use authrelay_client::auth::{AccessToken, CredentialStore};
use authrelay_client::crypto::KdfParams;
use authrelay_client::http::{build_query_string, is_successful, RawResponse, RequestEnvelope};
use authrelay_client::storage::{MemoryStore, SecureStore};
use authrelay_client::{AuthError, ErrorClassification, ResponseEnvelope};

/// Validates the success range boundaries.
#[test]
fn test_success_range() {
    assert!(!is_successful(199));
    assert!(is_successful(200));
    assert!(is_successful(302));
    assert!(is_successful(399));
    assert!(!is_successful(400));
    assert!(!is_successful(503));
}

/// Validates the flat provider error shape.
///
/// # Test Steps
/// 1. Classify a 401 with a flat `expired_token` body
/// 2. Verify kind, code and the missing-description fallback
/// 3. Verify the kind triggers a refresh
#[test]
fn test_flat_expired_token() {
    let response = ResponseEnvelope::from_raw(RawResponse::new(
        401,
        r#"{"error":"expired_token","error_code":401}"#,
    ));

    let err = response.error.clone().expect("classified");
    let AuthError::ExpiredToken(details) = &err else {
        panic!("expected ExpiredToken, got {err:?}");
    };
    assert_eq!(details.error_code, 401);
    assert_eq!(details.description(), Some("Missing error description"));
    assert!(ErrorClassification::triggers_refresh(&err));
}

/// Validates the nested API error shape.
#[test]
fn test_nested_api_exception() {
    let response = ResponseEnvelope::from_raw(RawResponse::new(
        400,
        r#"{"error":{"error":"bad","code":"400","type":"ApiException","description":"d"}}"#,
    ));

    match response.into_result() {
        Err(AuthError::Api(details)) => {
            assert_eq!(details.error, "bad");
            assert_eq!(details.error_code, 400);
            assert_eq!(details.error_type.as_deref(), Some("ApiException"));
            assert_eq!(details.description(), Some("d"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

/// Validates that a success status with an unparseable body is invalid.
#[test]
fn test_unparseable_success_body() {
    let response = ResponseEnvelope::from_raw(RawResponse::new(200, "<html>"));
    assert!(matches!(response.error, Some(AuthError::InvalidResponse { .. })));
    assert_eq!(response.json, serde_json::json!({}));
}

/// Validates query serialization with percent-encoded values.
#[test]
fn test_query_serialization() {
    let mut params = BTreeMap::new();
    params.insert("a".to_string(), "1".to_string());
    params.insert("b".to_string(), "x y".to_string());
    assert_eq!(build_query_string(&params), "?a=1&b=x%20y");
    assert_eq!(build_query_string(&BTreeMap::new()), "");

    let url = RequestEnvelope::get("https://id.example.com/api/2/me")
        .query("b", "x y")
        .query("a", "1")
        .complete_url();
    assert_eq!(url, "https://id.example.com/api/2/me?a=1&b=x%20y");
}

/// Validates persistence across store instances.
///
/// # Test Steps
/// 1. Save a token through one credential store
/// 2. Load it through a second store over the same backend
/// 3. Load with the wrong secret and verify the backend is cleared
#[test]
fn test_credential_round_trip_and_wrong_secret() {
    let backend = Arc::new(MemoryStore::new());
    let token = AccessToken::new("a-1", 3600, "r-1", "user-1");

    let writer = CredentialStore::new(Arc::clone(&backend), "device-1", KdfParams::minimal());
    writer.save(&token, "secret-1").expect("saved");
    assert!(backend.contains("access_token"));
    assert_ne!(backend.get("access_token").ok().flatten().as_deref(), Some("a-1"));

    let reader = CredentialStore::new(Arc::clone(&backend), "device-1", KdfParams::minimal());
    let loaded = reader.load("secret-1").expect("readable").expect("present");
    assert_eq!(loaded.access_token, "a-1");
    assert_eq!(loaded.refresh_token, "r-1");
    assert_eq!(loaded.user_id, "user-1");

    let err = reader.load("secret-2").unwrap_err();
    assert!(matches!(err, AuthError::Storage { .. }));
    assert!(backend.is_empty());
    assert!(reader.load("secret-1").expect("empty store").is_none());
}
