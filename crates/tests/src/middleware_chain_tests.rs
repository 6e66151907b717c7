//! Middleware Chain Ordering Tests
//!
//! The catalog route runs: injection detection → sanitization → API request schema → key
//! authentication → permission / scope grants → handler.
//!
//! The tests check that:
//! 1. Hostile input is reported before any credential check
//! 2. Rate-limit headers are attached once a key is known, even on a 403
//! 3. Data rewritten by sanitization is what the handler sees
//! 4. Error priority is validation > auth > rate limit > grants

use crate::support::{app, body_json, error_code, fast_config, get, issue_key, send};
use axum::http::StatusCode;
use server::router::CATALOG_READ_SCOPE;
use shelfgate_core::auth::RateLimitPolicy;

const INJECTED_SEARCH: &str = "/api/catalog/search?search=%3Cscript%3Ealert(1)%3C%2Fscript%3E";

#[tokio::test]
async fn test_injection_wins_over_missing_key() {
    let (app, _) = app(fast_config());

    let response = send(&app, get(INJECTED_SEARCH, None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "INJECTION_ATTACK_DETECTED");
    assert_eq!(json["error"]["details"]["type"], "xss");
    assert_eq!(json["error"]["details"]["field"], "query.search");
}

#[tokio::test]
async fn test_injection_wins_over_missing_scope() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &["bookings"], None);

    let response = send(&app, get(INJECTED_SEARCH, Some(&key))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key("x-ratelimit-limit-hour"));
    assert_eq!(error_code(response).await, "INJECTION_ATTACK_DETECTED");
}

#[tokio::test]
async fn test_rejected_input_does_not_count_against_key() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);
    let key_id = key.split_once('_').and_then(|(_, rest)| rest.split_once('.')).unwrap().0;

    let response = send(&app, get(INJECTED_SEARCH, Some(&key))).await;
    assert_eq!(error_code(response).await, "INJECTION_ATTACK_DETECTED");

    assert_eq!(state.keys.get(key_id).unwrap().usage.requests_this_hour, 0);
}

#[tokio::test]
async fn test_missing_key_after_clean_scan() {
    let (app, _) = app(fast_config());

    let response = send(&app, get("/api/catalog/search?search=dune", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "API_KEY_REQUIRED");
}

#[tokio::test]
async fn test_missing_scope_after_clean_scan() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &["bookings"], None);

    let response = send(&app, get("/api/catalog/search?search=dune", Some(&key))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()["x-ratelimit-limit-hour"], "1000");
    assert_eq!(response.headers()["x-ratelimit-limit-day"], "10000");

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "INSUFFICIENT_SCOPES");
    assert_eq!(json["error"]["required"], serde_json::json!([CATALOG_READ_SCOPE]));
    assert_eq!(json["error"]["granted"], serde_json::json!(["bookings"]));
}

#[tokio::test]
async fn test_injection_checked_before_schema() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);

    // `page=0` fails the schema, but the injection stage runs first.
    let uri = "/api/catalog/search?page=0&search=1%27%20OR%201%3D1";
    let response = send(&app, get(uri, Some(&key))).await;

    assert_eq!(error_code(response).await, "INJECTION_ATTACK_DETECTED");
}

#[tokio::test]
async fn test_schema_failure_after_clean_scan() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);

    let response = send(&app, get("/api/catalog/search?page=0&limit=500", Some(&key))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"]["details"][0]["field"], "page");
    assert_eq!(json["error"]["details"][1]["field"], "limit");
}

#[tokio::test]
async fn test_handler_sees_sanitized_query() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);

    let uri = "/api/catalog/search?search=%20%20piranesi%20";
    let response = send(&app, get(uri, Some(&key))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["books"][0]["author"], "Susanna Clarke");
}

#[tokio::test]
async fn test_rate_limit_wins_over_grants() {
    let (app, state) = app(fast_config());
    let policy = RateLimitPolicy { requests_per_hour: 2, requests_per_day: 100 };
    let key = issue_key(&state, &["bookings"], Some(policy));

    for _ in 0..2 {
        let response = send(&app, get("/api/catalog/search", Some(&key))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-ratelimit-limit-hour"], "2");
    }

    let response = send(&app, get("/api/catalog/search", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "3600");

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(json["error"]["retryAfter"], 3600);
}

#[tokio::test]
async fn test_daily_limit_reports_day_window() {
    let (app, state) = app(fast_config());
    let policy = RateLimitPolicy { requests_per_hour: 10, requests_per_day: 1 };
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], Some(policy));

    assert_eq!(send(&app, get("/api/catalog/search", Some(&key))).await.status(), StatusCode::OK);

    let response = send(&app, get("/api/catalog/search", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "86400");
}

#[tokio::test]
async fn test_revoked_key_rejected() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);
    let key_id = key.split_once('_').and_then(|(_, rest)| rest.split_once('.')).unwrap().0;

    assert_eq!(send(&app, get("/api/me", Some(&key))).await.status(), StatusCode::OK);

    state.keys.revoke(key_id).unwrap();
    let response = send(&app, get("/api/me", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_API_KEY");
}

#[tokio::test]
async fn test_usage_recorded_per_verified_request() {
    let (app, state) = app(fast_config());
    let key = issue_key(&state, &[CATALOG_READ_SCOPE], None);
    let key_id = key.split_once('_').and_then(|(_, rest)| rest.split_once('.')).unwrap().0;

    for _ in 0..3 {
        send(&app, get("/api/me", Some(&key))).await;
    }

    let credential = state.keys.get(key_id).unwrap();
    assert_eq!(credential.usage.requests_this_hour, 3);
    assert_eq!(credential.usage.requests_today, 3);
    assert!(state.keys.last_used_at(key_id).is_some());
}
