//! Booking API routes and the shared application state.
//!
//! | Route                                      | Guard                                   |
//! |--------------------------------------------|-----------------------------------------|
//! | `GET  /health`                             | none                                    |
//! | `POST /api/auth/register`                  | injection check, registration schema    |
//! | `POST /api/auth/login`                     | login schema                            |
//! | `GET  /api/me`                             | API key                                 |
//! | `GET  /api/catalog/search`                 | key with `catalog:read`, comprehensive  |
//! | `GET  /api/admin/security/recommendations` | key with `admin:security`               |

use crate::{
    error::ApiError,
    middleware::{
        api_key_middleware, comprehensive_validation, validation_middleware, ApiKeyAuthState,
        ValidationPipeline, ValidationStage, ValidationState,
    },
    users::{DirectoryError, UserDirectory},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shelfgate_core::{
    auth::{
        api_key::GeneratedKey, AuthError, AuthorizationContext, InMemoryKeyStore, NewApiKey,
        RateLimitPolicy, Role, UserRef,
    },
    config::AppConfig,
    middleware::{
        errors::{ErrorCode, MiddlewareError},
        validation::SchemaKind,
        ApiKeyAuth, ApiKeyAuthOptions,
    },
    monitor::{SecurityMonitor, TracingSecurityMonitor},
    password::{HashOptions, PasswordService},
};
use std::sync::Arc;
use tracing::{info, warn};

pub const CATALOG_READ_SCOPE: &str = "catalog:read";
pub const ADMIN_SECURITY_PERMISSION: &str = "admin:security";

const DEFAULT_PAGE_LIMIT: usize = 20;

/// Shared services behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub passwords: Arc<PasswordService>,
    pub keys: Arc<InMemoryKeyStore>,
    pub auth: Arc<ApiKeyAuth>,
    pub validation: Arc<ValidationState>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    /// # Errors
    ///
    /// Fails if the hashing configuration is invalid, or the key prefix or signing secret
    /// is rejected by the key store.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let monitor: Arc<dyn SecurityMonitor> = Arc::new(TracingSecurityMonitor);
        let passwords =
            PasswordService::with_environment(config.security.hashing.clone(), config.environment)?;

        let api_keys = &config.security.api_keys;
        let policy = RateLimitPolicy {
            requests_per_hour: u64::from(api_keys.requests_per_hour),
            requests_per_day: u64::from(api_keys.requests_per_day),
        };
        let keys = Arc::new(InMemoryKeyStore::new(
            api_keys.key_prefix.clone(),
            &api_keys.signing_secret,
            policy,
        )?);

        let auth = Arc::new(ApiKeyAuth::new(keys.clone(), monitor.clone(), config.environment));
        let validation = Arc::new(ValidationState::from_config(&config, monitor));

        Ok(Self {
            config: Arc::new(config),
            passwords: Arc::new(passwords),
            keys,
            auth,
            validation,
            users: Arc::new(UserDirectory::new()),
        })
    }

    /// Issues an unscoped admin key for operators.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyGenerationError`] if randomness is unavailable.
    pub fn issue_bootstrap_admin_key(&self) -> Result<GeneratedKey, AuthError> {
        self.keys.issue(NewApiKey {
            user: Some(UserRef {
                id: "bootstrap-admin".to_string(),
                email: None,
                role: Role::Admin,
            }),
            permissions: vec!["admin".to_string()],
            scopes: vec![CATALOG_READ_SCOPE.to_string(), "admin".to_string()],
            rate_limit: None,
            expires_at: None,
        })
    }
}

fn internal_error(err: impl std::fmt::Display) -> ApiError {
    warn!(error = %err, "request failed");
    ApiError(MiddlewareError::new(ErrorCode::InternalError, "Internal server error"))
}

fn success(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn create_router(state: AppState) -> Router {
    let validation = state.validation.clone();
    let keys = |options: ApiKeyAuthOptions| ApiKeyAuthState::new(state.auth.clone(), options);

    let register = Router::new().route("/api/auth/register", post(handle_register)).route_layer(
        from_fn_with_state(
            ValidationPipeline::new(
                validation.clone(),
                [
                    ValidationStage::InjectionDetection,
                    ValidationStage::Schema(SchemaKind::UserRegistration),
                    ValidationStage::Complete,
                ],
            ),
            validation_middleware,
        ),
    );

    let login = Router::new().route("/api/auth/login", post(handle_login)).route_layer(
        from_fn_with_state(
            ValidationPipeline::new(
                validation.clone(),
                [ValidationStage::Schema(SchemaKind::UserLogin)],
            ),
            validation_middleware,
        ),
    );

    let me = Router::new()
        .route("/api/me", get(handle_me))
        .route_layer(from_fn_with_state(keys(ApiKeyAuthOptions::required()), api_key_middleware));

    // Layers added later run first: validation, then key auth and grants.
    let catalog = Router::new()
        .route("/api/catalog/search", get(handle_catalog_search))
        .route_layer(from_fn_with_state(
            keys(ApiKeyAuthOptions::required().with_scopes([CATALOG_READ_SCOPE])),
            api_key_middleware,
        ))
        .route_layer(from_fn_with_state(
            ValidationPipeline::new(validation, comprehensive_validation()),
            validation_middleware,
        ));

    let admin = Router::new()
        .route("/api/admin/security/recommendations", get(handle_security_recommendations))
        .route_layer(from_fn_with_state(
            keys(ApiKeyAuthOptions::required().with_permissions([ADMIN_SECURITY_PERMISSION])),
            api_key_middleware,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(register)
        .merge(login)
        .merge(me)
        .merge(catalog)
        .merge(admin)
        .with_state(state)
}

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Creates an account and issues its first API key.
pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conflict = || {
        let message = DirectoryError::DuplicateEmail.to_string();
        ApiError(MiddlewareError::new(ErrorCode::Conflict, message))
    };

    if state.users.find(&request.email).is_some() {
        return Err(conflict());
    }

    let hashed = state
        .passwords
        .hash_password(&request.password, HashOptions::default())
        .await
        .map_err(internal_error)?;

    let user = state
        .users
        .register(&request.name, &request.email, hashed.hash, Role::User)
        .map_err(|_| conflict())?;

    let key = state
        .keys
        .issue(NewApiKey {
            user: Some(user.user_ref()),
            permissions: vec!["read:books".to_string(), "write:bookings".to_string()],
            scopes: vec![CATALOG_READ_SCOPE.to_string(), "bookings".to_string()],
            rate_limit: None,
            expires_at: None,
        })
        .map_err(internal_error)?;

    info!(user_id = %user.id, key_id = %key.key_id, "account registered");
    Ok((StatusCode::CREATED, success(json!({ "user": user, "apiKey": key.plaintext }))))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Checks credentials and upgrades the stored hash if its cost is below the current one.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.find(&request.email);
    let stored = user.as_ref().map_or("", |u| u.password_hash.as_str());

    // Unknown emails still pay for a verify call.
    let verified = state.passwords.verify_password(&request.password, stored).await;
    let user = match user {
        Some(user) if verified => user,
        _ => {
            return Err(ApiError(MiddlewareError::new(
                ErrorCode::InvalidCredentials,
                "Invalid email or password",
            )))
        }
    };

    if state.passwords.needs_rehash(&user.password_hash, None) {
        match state.passwords.hash_password(&request.password, HashOptions::default()).await {
            Ok(rehashed) => {
                if let Err(e) = state.users.update_hash(&user.email, rehashed.hash) {
                    warn!(user_id = %user.id, error = %e, "failed to store upgraded hash");
                } else {
                    info!(user_id = %user.id, "password hash upgraded");
                }
            }
            Err(e) => warn!(user_id = %user.id, error = %e, "password rehash failed"),
        }
    }

    Ok(success(json!({ "user": user })))
}

pub async fn handle_me(Extension(context): Extension<AuthorizationContext>) -> impl IntoResponse {
    success(json!(context))
}

pub async fn handle_security_recommendations(State(state): State<AppState>) -> impl IntoResponse {
    success(json!({
        "environment": state.passwords.environment(),
        "saltRounds": state.passwords.config().salt_rounds,
        "recommendations": state.passwords.security_recommendations(),
    }))
}

struct CatalogEntry {
    id: &'static str,
    title: &'static str,
    author: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: "bk-001", title: "Dune", author: "Frank Herbert" },
    CatalogEntry { id: "bk-002", title: "The Left Hand of Darkness", author: "Ursula K. Le Guin" },
    CatalogEntry { id: "bk-003", title: "Beloved", author: "Toni Morrison" },
    CatalogEntry { id: "bk-004", title: "The Name of the Rose", author: "Umberto Eco" },
    CatalogEntry { id: "bk-005", title: "Piranesi", author: "Susanna Clarke" },
    CatalogEntry { id: "bk-006", title: "Middlemarch", author: "George Eliot" },
];

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Case-insensitive title and author search over the demo catalog.
pub async fn handle_catalog_search(Query(query): Query<CatalogQuery>) -> impl IntoResponse {
    let needle = query.search.unwrap_or_default().to_lowercase();
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let page = query.page.unwrap_or(1);

    let matches: Vec<&CatalogEntry> = CATALOG
        .iter()
        .filter(|book| {
            needle.is_empty()
                || book.title.to_lowercase().contains(&needle)
                || book.author.to_lowercase().contains(&needle)
        })
        .collect();

    let books: Vec<Value> = matches
        .iter()
        .skip(page.saturating_sub(1).saturating_mul(limit))
        .take(limit)
        .map(|book| json!({ "id": book.id, "title": book.title, "author": book.author }))
        .collect();

    success(json!({ "total": matches.len(), "page": page, "books": books }))
}
