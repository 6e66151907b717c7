//! Rendering of core errors as HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use shelfgate_core::middleware::{
    errors::{ErrorCode, MiddlewareError},
    validation::{handle_validation_errors, PipelineError},
};
use tracing::error;

/// A [`MiddlewareError`] on its way out as a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub MiddlewareError);

impl From<MiddlewareError> for ApiError {
    fn from(err: MiddlewareError) -> Self {
        Self(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match handle_validation_errors(err) {
            Ok(translated) => Self(translated),
            Err(other) => {
                error!(error = %other, "unhandled handler error");
                Self(MiddlewareError::new(ErrorCode::InternalError, "Internal server error"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.0.envelope())).into_response();

        if let Some(retry_after) = self.0.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
