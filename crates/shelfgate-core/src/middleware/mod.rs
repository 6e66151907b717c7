//! Request middleware pipeline for authentication, authorization and input validation.
//!
//! This module provides the **business logic layer** for request processing middleware.
//! HTTP adapter functions (Axum extractors and responses) live in `crates/server/src/middleware`,
//! while this module contains the decisions themselves and never touches HTTP types.
//!
//! # Architecture
//!
//! A protected route runs the stages in this order:
//!
//! ```text
//!   Incoming Request
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  1. VALIDATION          │  detect_injection(), sanitize_value(),
//!   │     - Injection         │  validate_schema(), validate_uploads()
//!   │     - Sanitize          │
//!   │     - Schema / files    │
//!   └─────────────────────────┘
//!        │ 400 VALIDATION_ERROR / INJECTION_ATTACK_DETECTED / FILE_*
//!        ▼
//!   ┌─────────────────────────┐
//!   │  2. API KEY AUTH        │  ApiKeyAuth::authenticate()
//!   │     - Bearer / X-API-Key│  - JWT bearers are skipped
//!   │     - Verifier lookup   │  - Hourly / daily windows
//!   └─────────────────────────┘
//!        │ 401 API_KEY_REQUIRED / INVALID_API_KEY, 429 RATE_LIMIT_EXCEEDED
//!        ▼
//!   ┌─────────────────────────┐
//!   │  3. AUTHORIZATION       │  check_key_grants(), require_permissions(),
//!   │     - Permissions       │  require_scopes()
//!   │     - Scopes            │
//!   └─────────────────────────┘
//!        │ 403 INSUFFICIENT_PERMISSIONS / INSUFFICIENT_SCOPES
//!        ▼
//!   Route handler
//! ```
//!
//! Every rejection is a [`MiddlewareError`], rendered by the server as
//! `{ "success": false, "error": { "code", "message", ... } }`.
//!
//! # Module Organization
//!
//! - **[`auth`]**: key extraction and the authentication decision
//! - **[`authorization`]**: permission and scope requirements
//! - **[`errors`]**: error codes, statuses and the response envelope
//! - **[`validation`]**: schema checks, bypass headers and the stage factory names
//! - **[`rules`]**: built-in schema rules
//! - **[`sanitize`]**: recursive trimming and markup neutralization
//! - **[`injection`]**: SQL, script and NoSQL payload detection
//! - **[`files`]**: upload scanning

pub mod auth;
pub mod authorization;
pub mod errors;
pub mod files;
pub mod injection;
pub mod rules;
pub mod sanitize;
pub mod validation;

pub use auth::{ApiKeyAuth, ApiKeyAuthOptions, AuthDecision, KeySources, RequestInfo};
pub use authorization::{require_permissions, require_scopes};
pub use errors::{ErrorCode, ErrorEnvelope, MiddlewareError};
pub use files::{FileScanner, FileUploadOptions, SignatureScanner, UploadedFile, UploadedFiles};
pub use injection::{detect_injection, InjectionKind, InjectionMatch};
pub use rules::DefaultValidationRules;
pub use sanitize::{SanitizeMode, SanitizeOptions};
pub use validation::{
    ValidationBypassed, ValidationCompleted, ValidationKind, ValidationOutcome, ValidationRules,
    ValidationSetupError,
};
