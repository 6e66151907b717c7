//! Route-level permission and scope requirements.
//!
//! Both checks are pure functions of the request's [`AuthorizationContext`]. A JWT user
//! without the admin role is always denied by [`require_permissions`]: user accounts carry
//! no permission grants of their own.

use crate::{
    auth::AuthorizationContext,
    middleware::errors::{ErrorCode, MiddlewareError},
};
use tracing::{debug, warn};

/// Requires every permission in `required`.
///
/// # Errors
///
/// - `INSUFFICIENT_PERMISSIONS` with `required` and the key's grants if an API key lacks
///   any of them, or with empty grants for a non-admin user
/// - `AUTHENTICATION_REQUIRED` if the request is anonymous
pub fn require_permissions(
    context: Option<&AuthorizationContext>,
    required: &[String],
) -> Result<(), MiddlewareError> {
    let Some(context) = context else {
        return Err(MiddlewareError::authentication_required());
    };

    if context.is_admin() {
        debug!("admin role bypasses permission check");
        return Ok(());
    }

    if let Some(key) = &context.api_key {
        if required.iter().all(|p| key.has_permission(p)) {
            return Ok(());
        }
        warn!(key_id = %key.key_id, ?required, "insufficient permissions");
        return Err(MiddlewareError::insufficient_permissions(
            required.to_vec(),
            key.granted_permissions(),
        ));
    }

    if let Some(user) = &context.user {
        warn!(user_id = %user.id, role = %user.role, ?required, "user lacks permissions");
        return Err(MiddlewareError::insufficient_permissions(required.to_vec(), Vec::new()));
    }

    Err(MiddlewareError::authentication_required())
}

/// Requires every scope in `required` on the request's API key.
///
/// # Errors
///
/// - `API_KEY_REQUIRED` if the request was not authenticated by API key
/// - `INSUFFICIENT_SCOPES` with `required` and the key's scopes if any is missing
pub fn require_scopes(
    context: Option<&AuthorizationContext>,
    required: &[String],
) -> Result<(), MiddlewareError> {
    let Some(key) = context.and_then(|c| c.api_key.as_ref()) else {
        return Err(MiddlewareError::new(
            ErrorCode::ApiKeyRequired,
            "API key required for scope validation",
        ));
    };

    if required.iter().all(|s| key.has_scope(s)) {
        return Ok(());
    }

    warn!(key_id = %key.key_id, ?required, "insufficient scopes");
    Err(MiddlewareError::insufficient_scopes(required.to_vec(), key.granted_scopes()))
}
