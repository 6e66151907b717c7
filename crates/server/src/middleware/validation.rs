//! Validation stages as axum middleware.
//!
//! A [`ValidationPipeline`] holds the shared collaborators and an ordered list of
//! [`ValidationStage`]s. The middleware buffers the body once, parses JSON bodies, runs the
//! stages in order and forwards the (possibly sanitized) request. The first failing stage
//! short-circuits with its error envelope.
//!
//! Only JSON bodies can be scanned and sanitized. A pipeline with an injection or sanitize
//! stage refuses any other non-empty body, unless it also has an upload stage: uploads
//! arrive as [`UploadedFiles`] and are checked by the file scanner instead.

use crate::error::ApiError;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};
use shelfgate_core::{
    config::AppConfig,
    middleware::{
        errors::{ErrorCode, MiddlewareError},
        files::{validate_uploads, FileScanner, FileUploadOptions, SignatureScanner, UploadedFiles},
        injection::detect_injection,
        sanitize::{sanitize_query, sanitize_value, SanitizeOptions},
        validation::{
            is_bypass_request, validate_schema, ApiRequestData, FieldError, SchemaKind,
            PipelineError, ValidationBypassed, ValidationCompleted, ValidationKind,
            ValidationRules, ValidationSetupError, INTERNAL_CALL_HEADER, SYSTEM_BYPASS_HEADER,
        },
        DefaultValidationRules,
    },
    monitor::{self, SecurityEvent, SecurityMonitor, Severity},
};
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

/// One step of a validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    Schema(SchemaKind),
    FileUpload(FileUploadOptions),
    Sanitize,
    InjectionDetection,
    Bypass,
    /// Marks the request with [`ValidationCompleted`]
    Complete,
}

impl From<ValidationKind> for ValidationStage {
    fn from(kind: ValidationKind) -> Self {
        match kind {
            ValidationKind::UserRegistration => Self::Schema(SchemaKind::UserRegistration),
            ValidationKind::UserLogin => Self::Schema(SchemaKind::UserLogin),
            ValidationKind::ApiRequest => Self::Schema(SchemaKind::ApiRequest),
            ValidationKind::FileUpload => Self::FileUpload(FileUploadOptions::default()),
            ValidationKind::Sanitize => Self::Sanitize,
            ValidationKind::InjectionDetection => Self::InjectionDetection,
            ValidationKind::Bypass => Self::Bypass,
        }
    }
}

/// Looks up a stage by its factory name, e.g. `"userRegistration"` or `"sanitize"`.
///
/// # Errors
///
/// [`ValidationSetupError::InvalidArgument`] for an unknown name.
pub fn get_validation_middleware(kind: &str) -> Result<ValidationStage, ValidationSetupError> {
    kind.parse::<ValidationKind>().map(ValidationStage::from)
}

/// Injection detection, sanitization, API request validation, completion marker.
#[must_use]
pub fn comprehensive_validation() -> [ValidationStage; 4] {
    [
        ValidationStage::InjectionDetection,
        ValidationStage::Sanitize,
        ValidationStage::Schema(SchemaKind::ApiRequest),
        ValidationStage::Complete,
    ]
}

/// Collaborators shared by every pipeline.
pub struct ValidationState {
    pub rules: Arc<dyn ValidationRules>,
    pub scanner: Arc<dyn FileScanner>,
    pub monitor: Arc<dyn SecurityMonitor>,
    pub sanitize: SanitizeOptions,
    /// Configured upload policy; routes derive their own via [`Self::file_upload`]
    pub uploads: FileUploadOptions,
    pub max_body_bytes: usize,
}

impl ValidationState {
    /// Built-in rules and scanner configured from `config`.
    pub fn from_config(config: &AppConfig, monitor: Arc<dyn SecurityMonitor>) -> Self {
        Self {
            rules: Arc::new(DefaultValidationRules),
            scanner: Arc::new(SignatureScanner::new(config.validation.max_file_size_bytes)),
            monitor,
            sanitize: SanitizeOptions::with_mode(config.validation.sanitize_mode),
            uploads: FileUploadOptions {
                required: true,
                min_security_score: config.validation.min_file_security_score,
            },
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    /// Upload stage with the configured minimum score.
    #[must_use]
    pub fn file_upload(&self, required: bool) -> ValidationStage {
        ValidationStage::FileUpload(FileUploadOptions { required, ..self.uploads })
    }
}

/// Middleware state: collaborators plus this route's stages.
#[derive(Clone)]
pub struct ValidationPipeline {
    state: Arc<ValidationState>,
    stages: Arc<[ValidationStage]>,
}

impl ValidationPipeline {
    pub fn new(state: Arc<ValidationState>, stages: impl Into<Arc<[ValidationStage]>>) -> Self {
        Self { state, stages: stages.into() }
    }

    #[must_use]
    pub fn stages(&self) -> &[ValidationStage] {
        &self.stages
    }

    fn accepts_uploads(&self) -> bool {
        self.stages.iter().any(|stage| matches!(stage, ValidationStage::FileUpload(_)))
    }

    /// `true` if a stage inspects the body and no stage accepts uploads.
    fn requires_json_body(&self) -> bool {
        let inspects = self.stages.iter().any(|stage| {
            matches!(stage, ValidationStage::InjectionDetection | ValidationStage::Sanitize)
        });
        inspects && !self.accepts_uploads()
    }
}

/// Request data the stages read and rewrite.
struct StageInput {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    query_changed: bool,
    body_changed: bool,
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
}

fn body_error(message: &str) -> PipelineError {
    PipelineError::Validation(vec![FieldError::new("body", message)])
}

fn rebuild_uri(uri: &Uri, query: &[(String, String)]) -> Option<Uri> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query {
        serializer.append_pair(key, value);
    }
    let encoded = serializer.finish();

    let path = uri.path();
    let path_and_query =
        if encoded.is_empty() { path.to_string() } else { format!("{path}?{encoded}") };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Runs `stages` in order against one request.
///
/// # Errors
///
/// The first stage failure.
async fn apply_stages(
    state: &ValidationState,
    stages: &[ValidationStage],
    input: &mut StageInput,
    parts: &mut Parts,
) -> Result<(), MiddlewareError> {
    for stage in stages {
        match *stage {
            ValidationStage::Bypass => {
                let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
                if is_bypass_request(header(INTERNAL_CALL_HEADER), header(SYSTEM_BYPASS_HEADER)) {
                    debug!(path = %input.path, "validation bypass requested");
                    parts.extensions.insert(ValidationBypassed);
                }
            }
            ValidationStage::InjectionDetection => {
                if let Some(hit) = detect_injection(input.body.as_ref(), &input.query) {
                    warn!(
                        kind = %hit.kind,
                        field = %hit.field,
                        path = %input.path,
                        "injection detected"
                    );
                    let event = SecurityEvent::new("injection_attempt", Severity::High)
                        .with_details(json!({
                            "type": hit.kind,
                            "field": hit.field,
                            "endpoint": format!("{} {}", input.method, input.path),
                        }));
                    monitor::report(state.monitor.as_ref(), event).await;

                    return Err(MiddlewareError::new(
                        ErrorCode::InjectionAttackDetected,
                        "Potential injection attack detected",
                    )
                    .with_details(json!({ "type": hit.kind, "field": hit.field })));
                }
            }
            ValidationStage::Sanitize => {
                if let Some(body) = input.body.as_mut() {
                    sanitize_value(body, state.sanitize);
                    input.body_changed = true;
                }
                if !input.query.is_empty() {
                    sanitize_query(&mut input.query, state.sanitize.mode);
                    input.query_changed = true;
                }
            }
            ValidationStage::Schema(kind) => {
                let request = ApiRequestData {
                    method: &input.method,
                    path: &input.path,
                    query: &input.query,
                    body: input.body.as_ref(),
                };
                let outcome = validate_schema(state.rules.as_ref(), kind, &request).await?;
                parts.extensions.insert(outcome);
            }
            ValidationStage::FileUpload(options) => {
                let files = parts.extensions.get::<UploadedFiles>();
                let results = validate_uploads(state.scanner.as_ref(), files, options).await?;
                parts.extensions.insert(results);
            }
            ValidationStage::Complete => {
                parts.extensions.insert(ValidationCompleted);
            }
        }
    }

    Ok(())
}

/// Axum middleware running the pipeline's stages.
///
/// # Errors
///
/// The first failing stage's envelope. Body problems go through
/// [`handle_validation_errors`](shelfgate_core::middleware::validation::handle_validation_errors):
/// `VALIDATION_ERROR` for an unreadable, malformed or non-JSON body, `FILE_UPLOAD_ERROR` when
/// an upload route's body cannot be read.
pub async fn validation_middleware(
    State(pipeline): State<ValidationPipeline>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, pipeline.state.max_body_bytes).await.map_err(|e| {
        warn!(error = %e, "request body could not be read");
        if pipeline.accepts_uploads() {
            PipelineError::FileUpload(format!(
                "Upload could not be read (limit {} bytes)",
                pipeline.state.max_body_bytes
            ))
        } else {
            body_error("Request body could not be read")
        }
    })?;

    let body = if bytes.is_empty() {
        None
    } else if is_json(&parts.headers) {
        Some(
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|_| body_error("Request body must be valid JSON"))?,
        )
    } else if pipeline.requires_json_body() {
        warn!(path = %parts.uri.path(), "non-JSON body refused by validation pipeline");
        return Err(body_error("Request body must be JSON").into());
    } else {
        None
    };

    let mut input = StageInput {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default(),
        body,
        query_changed: false,
        body_changed: false,
    };

    apply_stages(&pipeline.state, &pipeline.stages, &mut input, &mut parts).await?;

    if input.query_changed {
        if let Some(uri) = rebuild_uri(&parts.uri, &input.query) {
            parts.uri = uri;
        }
    }

    let bytes = match input.body {
        Some(body) if input.body_changed => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Bytes::from(serde_json::to_vec(&body).map_err(|e| PipelineError::Other(Box::new(e)))?)
        }
        _ => bytes,
    };

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
