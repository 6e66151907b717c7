//! Password Hashing Integration Tests
//!
//! Hashing parameters travel from `AppConfig` (file, then `BCRYPT_ROUNDS`) into the
//! service the router uses. These tests follow that path end to end: stored hashes carry
//! the configured cost, raising the cost upgrades hashes on the next login, and the
//! recommendations endpoint reflects the environment.

use crate::support::{app, body_json, fast_config, get, post_json, send, PASSWORD};
use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;
use shelfgate_core::{
    config::{AppConfig, Environment, BCRYPT_ROUNDS_VAR},
    password::{extract_rounds_from_hash, HashingConfig, Priority},
};

fn registration(email: &str) -> serde_json::Value {
    json!({ "name": "Octavia", "email": email, "password": PASSWORD })
}

#[tokio::test]
#[serial]
async fn test_bcrypt_rounds_env_reaches_stored_hash() {
    let path = std::env::temp_dir().join(format!("shelfgate-tests-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "[security.api_keys]\nsigning_secret = \"integration-signing-secret\"\n\n\
         [security.hashing]\nsalt_rounds = 12\nmin_timing_ms = 0\n",
    )
    .unwrap();

    std::env::set_var(BCRYPT_ROUNDS_VAR, "10");
    let loaded = AppConfig::from_file(&path);
    std::env::remove_var(BCRYPT_ROUNDS_VAR);
    std::fs::remove_file(&path).unwrap();

    let config = loaded.unwrap();
    assert_eq!(config.security.hashing.salt_rounds, 10);

    let (app, state) = app(config);
    let request = post_json("/api/auth/register", &registration("o@example.com"));
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let stored = state.users.find("o@example.com").unwrap();
    assert_eq!(extract_rounds_from_hash(&stored.password_hash).unwrap(), 10);
    assert!(stored.password_hash.starts_with("$2b$10$"));
}

#[tokio::test]
async fn test_raised_cost_upgrades_hash_on_login() {
    let (app, state) = app(fast_config());
    let request = post_json("/api/auth/register", &registration("u@example.com"));
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let before = state.users.find("u@example.com").unwrap().password_hash;
    assert!(!state.passwords.needs_rehash(&before, None));

    let raised = HashingConfig { salt_rounds: 11, min_timing_ms: 0, ..HashingConfig::default() };
    state.passwords.update_config(raised).unwrap();
    assert!(state.passwords.needs_rehash(&before, None));

    let login = json!({ "email": "U@Example.com", "password": PASSWORD });
    let response = send(&app, post_json("/api/auth/login", &login)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = state.users.find("u@example.com").unwrap().password_hash;
    assert_ne!(before, after);
    assert_eq!(extract_rounds_from_hash(&after).unwrap(), 11);
    assert!(state.passwords.verify_password(PASSWORD, &after).await);
}

#[tokio::test]
async fn test_invalid_update_keeps_previous_config() {
    let (_, state) = app(fast_config());

    let too_weak = HashingConfig { salt_rounds: 8, ..HashingConfig::default() };
    assert!(state.passwords.update_config(too_weak).is_err());
    assert_eq!(state.passwords.config().salt_rounds, 10);
}

#[tokio::test]
async fn test_recommendations_reflect_production() {
    let mut config = fast_config();
    config.environment = Environment::Production;
    let (app, state) = app(config);
    let admin_key = state.issue_bootstrap_admin_key().unwrap().plaintext;

    let recommendations = state.passwords.security_recommendations();
    let production = recommendations.iter().find(|r| r.kind == "production").unwrap();
    assert_eq!(production.priority, Priority::Critical);

    let uri = "/api/admin/security/recommendations";
    let response = send(&app, get(uri, Some(&admin_key))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["environment"], "production");
    assert_eq!(json["data"]["saltRounds"], 10);
    let kinds: Vec<&str> = json["data"]["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["salt_rounds", "timing", "production"]);
}

#[tokio::test]
async fn test_development_skips_production_recommendation() {
    let (_, state) = app(fast_config());

    let kinds: Vec<&str> =
        state.passwords.security_recommendations().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, ["salt_rounds", "timing"]);
}
