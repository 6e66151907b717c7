//! HTTP middleware for the booking API.
//!
//! These are axum adapters around `shelfgate_core::middleware`. They pull headers, query
//! strings and bodies out of the request, hand them to the core decisions and turn the
//! results into extensions or error envelopes.

pub mod auth;
pub mod request_id;
pub mod validation;

pub use auth::{
    api_key_middleware, require_permissions_middleware, require_scopes_middleware,
    ApiKeyAuthState, ResolvedClientIp,
};
pub use request_id::{create_request_id_layers, RequestSpan, UuidRequestIdGenerator, X_REQUEST_ID};
pub use validation::{
    comprehensive_validation, get_validation_middleware, validation_middleware,
    ValidationPipeline, ValidationStage, ValidationState,
};
