use crate::{auth::RateLimitWindow, middleware::validation::FieldError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes carried in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ApiKeyRequired,
    InvalidApiKey,
    RateLimitExceeded,
    InsufficientPermissions,
    InsufficientScopes,
    AuthenticationRequired,
    AuthenticationError,
    ValidationError,
    ValidationSystemError,
    FileRequired,
    FileSecurityRisk,
    FileValidationError,
    FileValidationSystemError,
    FileUploadError,
    InjectionAttackDetected,
    /// Login with an unknown email or a wrong password
    InvalidCredentials,
    /// Email already registered
    Conflict,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKeyRequired => "API_KEY_REQUIRED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::InsufficientScopes => "INSUFFICIENT_SCOPES",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ValidationSystemError => "VALIDATION_SYSTEM_ERROR",
            Self::FileRequired => "FILE_REQUIRED",
            Self::FileSecurityRisk => "FILE_SECURITY_RISK",
            Self::FileValidationError => "FILE_VALIDATION_ERROR",
            Self::FileValidationSystemError => "FILE_VALIDATION_SYSTEM_ERROR",
            Self::FileUploadError => "FILE_UPLOAD_ERROR",
            Self::InjectionAttackDetected => "INJECTION_ATTACK_DETECTED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Conflict => "CONFLICT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this code is always sent with.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::ValidationError
            | Self::FileRequired
            | Self::FileSecurityRisk
            | Self::FileValidationError
            | Self::FileUploadError
            | Self::InjectionAttackDetected => 400,
            Self::ApiKeyRequired
            | Self::InvalidApiKey
            | Self::AuthenticationRequired
            | Self::InvalidCredentials => 401,
            Self::InsufficientPermissions | Self::InsufficientScopes => 403,
            Self::Conflict => 409,
            Self::RateLimitExceeded => 429,
            Self::AuthenticationError
            | Self::ValidationSystemError
            | Self::FileValidationSystemError
            | Self::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request rejection produced by any middleware stage.
///
/// Serializes to the `error` member of the envelope; see [`MiddlewareError::envelope`].
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct MiddlewareError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// `{ "success": false, "error": { ... } }`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub success: bool,
    pub error: &'a MiddlewareError,
}

impl MiddlewareError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
            required: None,
            granted: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.code.status()
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope { success: false, error: self }
    }

    #[must_use]
    pub fn api_key_required() -> Self {
        Self::new(ErrorCode::ApiKeyRequired, "API key required")
    }

    #[must_use]
    pub fn invalid_api_key() -> Self {
        Self::new(ErrorCode::InvalidApiKey, "Invalid API key")
    }

    #[must_use]
    pub fn rate_limited(window: RateLimitWindow) -> Self {
        Self {
            retry_after: Some(window.retry_after_secs()),
            ..Self::new(ErrorCode::RateLimitExceeded, window.message())
        }
    }

    #[must_use]
    pub fn authentication_error() -> Self {
        Self::new(ErrorCode::AuthenticationError, "Internal authentication error")
    }

    #[must_use]
    pub fn authentication_required() -> Self {
        Self::new(ErrorCode::AuthenticationRequired, "Authentication required")
    }

    #[must_use]
    pub fn insufficient_permissions(required: Vec<String>, granted: Vec<String>) -> Self {
        Self {
            required: Some(required),
            granted: Some(granted),
            ..Self::new(ErrorCode::InsufficientPermissions, "Insufficient permissions")
        }
    }

    #[must_use]
    pub fn insufficient_scopes(required: Vec<String>, granted: Vec<String>) -> Self {
        Self {
            required: Some(required),
            granted: Some(granted),
            ..Self::new(ErrorCode::InsufficientScopes, "Insufficient scopes")
        }
    }

    /// `VALIDATION_ERROR` carrying the ordered field errors as `details`.
    #[must_use]
    pub fn validation_failed(errors: &[FieldError]) -> Self {
        let details = serde_json::to_value(errors).unwrap_or(serde_json::Value::Null);
        Self::new(ErrorCode::ValidationError, "Validation failed").with_details(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::ApiKeyRequired.status(), 401);
        assert_eq!(ErrorCode::InvalidApiKey.status(), 401);
        assert_eq!(ErrorCode::RateLimitExceeded.status(), 429);
        assert_eq!(ErrorCode::InsufficientScopes.status(), 403);
        assert_eq!(ErrorCode::AuthenticationError.status(), 500);
        assert_eq!(ErrorCode::InjectionAttackDetected.status(), 400);
        assert_eq!(ErrorCode::FileValidationSystemError.status(), 500);
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        for code in [
            ErrorCode::ApiKeyRequired,
            ErrorCode::FileValidationSystemError,
            ErrorCode::InjectionAttackDetected,
            ErrorCode::InvalidCredentials,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), code.as_str());
        }
    }

    #[test]
    fn test_envelope_omits_absent_members() {
        let err = MiddlewareError::invalid_api_key();
        let json = serde_json::to_value(err.envelope()).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "INVALID_API_KEY");
        assert_eq!(json["error"]["message"], "Invalid API key");
        let error = json["error"].as_object().unwrap();
        assert_eq!(error.len(), 2);
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = MiddlewareError::rate_limited(RateLimitWindow::Daily);
        let json = serde_json::to_value(err.envelope()).unwrap();
        assert_eq!(json["error"]["retryAfter"], 86_400);
        assert_eq!(json["error"]["message"], "Daily rate limit exceeded");
    }

    #[test]
    fn test_validation_failed_details_preserve_order() {
        let errors = vec![
            FieldError::new("email", "Email is required"),
            FieldError::new("password", "Password is required"),
        ];
        let err = MiddlewareError::validation_failed(&errors);
        let details = err.details.unwrap();
        assert_eq!(details[0]["field"], "email");
        assert_eq!(details[1]["field"], "password");
    }
}
