use crate::middleware::errors::{ErrorCode, MiddlewareError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Header that marks a call from another internal service.
pub const INTERNAL_CALL_HEADER: &str = "x-internal-call";
/// Header that marks a system job.
pub const SYSTEM_BYPASS_HEADER: &str = "x-system-bypass";

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Outcome of one rules check. Errors keep the order in which rules ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }
}

impl ValidationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(FieldError::new(field, message));
    }
}

/// Failure of the rules engine itself, as opposed to a rule violation.
#[derive(Error, Debug, Clone)]
pub enum RulesError {
    /// A backing service the rules depend on could not be reached
    #[error("Rules backend unavailable: {0}")]
    Unavailable(String),

    #[error("Rules engine error: {0}")]
    Internal(String),
}

/// What the rules engine sees of a generic API request.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequestData<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub body: Option<&'a Value>,
}

/// Schema rules collaborator.
#[async_trait]
pub trait ValidationRules: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RulesError`] only if the rules engine cannot evaluate the input.
    async fn validate_registration(&self, body: &Value) -> Result<ValidationResult, RulesError>;

    /// # Errors
    ///
    /// Returns [`RulesError`] only if the rules engine cannot evaluate the input.
    async fn validate_login(&self, body: &Value) -> Result<ValidationResult, RulesError>;

    /// # Errors
    ///
    /// Returns [`RulesError`] only if the rules engine cannot evaluate the input.
    async fn validate_api_request(
        &self,
        request: &ApiRequestData<'_>,
    ) -> Result<ValidationResult, RulesError>;
}

/// The three schema checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    UserRegistration,
    UserLogin,
    ApiRequest,
}

/// Attached to a request that passed a schema check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub kind: SchemaKind,
    pub result: ValidationResult,
}

/// Attached to a request that skipped validation through a bypass header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationBypassed;

/// Attached once every validation stage of a pipeline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationCompleted;

/// Runs one schema check and maps the result to the error envelope.
///
/// # Errors
///
/// `VALIDATION_ERROR` with the field errors as details if a rule failed, or
/// `VALIDATION_SYSTEM_ERROR` if the rules engine failed.
pub async fn validate_schema(
    rules: &dyn ValidationRules,
    kind: SchemaKind,
    request: &ApiRequestData<'_>,
) -> Result<ValidationOutcome, MiddlewareError> {
    let empty = Value::Null;
    let body = request.body.unwrap_or(&empty);

    let result = match kind {
        SchemaKind::UserRegistration => rules.validate_registration(body).await,
        SchemaKind::UserLogin => rules.validate_login(body).await,
        SchemaKind::ApiRequest => rules.validate_api_request(request).await,
    };

    match result {
        Ok(result) if result.is_valid => {
            debug!(?kind, path = request.path, "schema validation passed");
            Ok(ValidationOutcome { kind, result })
        }
        Ok(result) => {
            warn!(?kind, path = request.path, errors = result.errors.len(), "validation failed");
            Err(MiddlewareError::validation_failed(&result.errors))
        }
        Err(e) => {
            error!(error = %e, ?kind, path = request.path, "validation rules failed");
            Err(MiddlewareError::new(ErrorCode::ValidationSystemError, "Validation system error"))
        }
    }
}

/// `true` if either bypass header carries exactly `"true"`.
#[must_use]
pub fn is_bypass_request(internal_call: Option<&str>, system_bypass: Option<&str>) -> bool {
    internal_call == Some("true") || system_bypass == Some("true")
}

/// Errors surfaced by handlers or later stages that the pipeline knows how to translate.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("file upload failed: {0}")]
    FileUpload(String),

    /// Anything else; left for the caller's own error handling
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Translates known pipeline errors into envelope errors.
///
/// # Errors
///
/// Returns the original error unchanged if it is neither a validation nor an upload error.
pub fn handle_validation_errors(err: PipelineError) -> Result<MiddlewareError, PipelineError> {
    match err {
        PipelineError::Validation(errors) => Ok(MiddlewareError::validation_failed(&errors)),
        PipelineError::FileUpload(message) => {
            Ok(MiddlewareError::new(ErrorCode::FileUploadError, "File upload error")
                .with_details(serde_json::json!({ "message": message })))
        }
        other @ PipelineError::Other(_) => Err(other),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationSetupError {
    #[error("Unknown validation middleware type: {0}")]
    InvalidArgument(String),
}

/// Names accepted by the validation middleware factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    UserRegistration,
    UserLogin,
    ApiRequest,
    FileUpload,
    Sanitize,
    InjectionDetection,
    Bypass,
}

impl ValidationKind {
    pub const ALL: [Self; 7] = [
        Self::UserRegistration,
        Self::UserLogin,
        Self::ApiRequest,
        Self::FileUpload,
        Self::Sanitize,
        Self::InjectionDetection,
        Self::Bypass,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRegistration => "userRegistration",
            Self::UserLogin => "userLogin",
            Self::ApiRequest => "apiRequest",
            Self::FileUpload => "fileUpload",
            Self::Sanitize => "sanitize",
            Self::InjectionDetection => "injectionDetection",
            Self::Bypass => "bypass",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationKind {
    type Err = ValidationSetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationSetupError::InvalidArgument(s.to_string()))
    }
}
