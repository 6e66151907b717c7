#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use serde_json::Value;
use server::router::{create_router, AppState};
use shelfgate_core::{
    auth::{NewApiKey, RateLimitPolicy},
    config::AppConfig,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "Corr3ct!horse";

/// Defaults with a fixed signing secret and the cheapest allowed bcrypt cost.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.security.api_keys.signing_secret = "integration-signing-secret".to_string();
    config.security.hashing.salt_rounds = 10;
    config.security.hashing.min_timing_ms = 0;
    config
}

pub fn app(config: AppConfig) -> (Router, AppState) {
    let state = AppState::new(config).unwrap();
    (create_router(state.clone()), state)
}

pub fn issue_key(state: &AppState, scopes: &[&str], policy: Option<RateLimitPolicy>) -> String {
    state
        .keys
        .issue(NewApiKey {
            user: None,
            permissions: vec!["read:books".to_string()],
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            rate_limit: policy,
            expires_at: None,
        })
        .unwrap()
        .plaintext
}

pub fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn error_code(response: Response<Body>) -> String {
    body_json(response).await["error"]["code"].as_str().unwrap_or_default().to_string()
}
