use crate::{
    auth::{
        ApiKeyCredential, ApiKeyVerifier, AuthorizationContext, Verification, VerificationContext,
    },
    config::Environment,
    middleware::errors::MiddlewareError,
    monitor::{self, SecurityEvent, SecurityMonitor, Severity},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tracing::{debug, error, warn};
use url::form_urlencoded;

/// Per-route behavior of API key authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeyAuthOptions {
    /// Reject requests without a key
    pub required: bool,
    /// With `required`, let a JWT bearer through to user authentication instead
    pub allow_user_auth: bool,
    /// Every permission the key must hold
    pub permissions: Vec<String>,
    /// Every scope the key must hold
    pub scopes: Vec<String>,
}

impl ApiKeyAuthOptions {
    #[must_use]
    pub fn required() -> Self {
        Self { required: true, ..Self::default() }
    }

    #[must_use]
    pub fn optional() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_user_auth(mut self) -> Self {
        self.allow_user_auth = true;
        self
    }

    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// Raw header and query values a key may be read from.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySources<'a> {
    /// `Authorization` header
    pub authorization: Option<&'a str>,
    /// `X-API-Key` header
    pub api_key_header: Option<&'a str>,
    /// Raw query string, without the leading `?`
    pub query: Option<&'a str>,
}

/// Request metadata forwarded to the verifier.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
}

impl RequestInfo {
    #[must_use]
    pub fn verification_context(&self) -> VerificationContext {
        VerificationContext {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            endpoint: format!("{} {}", self.method, self.path),
        }
    }
}

/// Result of the authentication step when the request may proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    /// No key and none required
    Anonymous,
    /// No key, but a JWT bearer is present and user authentication is allowed
    DeferredToUserAuth,
    Authenticated(AuthorizationContext),
}

/// Token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Whether `token` looks like a JWT: three non-empty base64url segments whose first segment
/// decodes to a JSON object.
#[must_use]
pub fn is_jwt(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return false;
    }

    let base64url = |s: &str| {
        !s.is_empty()
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
    };
    if !segments.iter().all(|s| base64url(s)) {
        return false;
    }

    URL_SAFE_NO_PAD
        .decode(segments[0].trim_end_matches('='))
        .ok()
        .and_then(|header| serde_json::from_slice::<serde_json::Value>(&header).ok())
        .is_some_and(|header| header.is_object())
}

/// Picks the API key from the request, in priority order:
///
/// 1. a non-JWT `Authorization: Bearer` token
/// 2. the `X-API-Key` header
/// 3. the `api_key` query parameter, only in development
#[must_use]
pub fn extract_api_key(sources: &KeySources<'_>, environment: Environment) -> Option<String> {
    if let Some(token) = sources.authorization.and_then(bearer_token) {
        if !is_jwt(token) {
            return Some(token.to_string());
        }
    }

    if let Some(key) = sources.api_key_header.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    if environment.is_development() {
        return sources.query.and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(k, v)| k == "api_key" && !v.is_empty())
                .map(|(_, v)| v.into_owned())
        });
    }

    None
}

/// Whether the request carries a JWT bearer token.
#[must_use]
pub fn has_jwt_bearer(sources: &KeySources<'_>) -> bool {
    sources.authorization.and_then(bearer_token).is_some_and(is_jwt)
}

/// Client address: the proxy-resolved IP if one was set upstream, else the socket peer,
/// else loopback.
#[must_use]
pub fn client_ip(resolved: Option<IpAddr>, peer: Option<SocketAddr>) -> String {
    resolved
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}

/// Checks a granted key against the route's required permissions and scopes.
///
/// # Errors
///
/// `INSUFFICIENT_PERMISSIONS` or `INSUFFICIENT_SCOPES`, each with the full required and
/// granted lists.
pub fn check_key_grants(
    credential: &ApiKeyCredential,
    options: &ApiKeyAuthOptions,
) -> Result<(), MiddlewareError> {
    if !options.permissions.iter().all(|p| credential.has_permission(p)) {
        warn!(
            key_id = %credential.key_id,
            required = ?options.permissions,
            "api key lacks permissions"
        );
        return Err(MiddlewareError::insufficient_permissions(
            options.permissions.clone(),
            credential.granted_permissions(),
        ));
    }

    if !options.scopes.iter().all(|s| credential.has_scope(s)) {
        warn!(key_id = %credential.key_id, required = ?options.scopes, "api key lacks scopes");
        return Err(MiddlewareError::insufficient_scopes(
            options.scopes.clone(),
            credential.granted_scopes(),
        ));
    }

    Ok(())
}

/// API key authentication independent of the HTTP framework.
pub struct ApiKeyAuth {
    verifier: Arc<dyn ApiKeyVerifier>,
    monitor: Arc<dyn SecurityMonitor>,
    environment: Environment,
}

impl ApiKeyAuth {
    pub fn new(
        verifier: Arc<dyn ApiKeyVerifier>,
        monitor: Arc<dyn SecurityMonitor>,
        environment: Environment,
    ) -> Self {
        Self { verifier, monitor, environment }
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Resolves the request's key to a decision.
    ///
    /// Permission and scope requirements in `options` are not checked here; callers apply
    /// [`check_key_grants`] after attaching the rate-limit headers.
    ///
    /// # Errors
    ///
    /// - `API_KEY_REQUIRED` if a key is required and absent
    /// - `INVALID_API_KEY` if the verifier rejects the key
    /// - `RATE_LIMIT_EXCEEDED` with `retryAfter` if a usage window is exhausted
    /// - `AUTHENTICATION_ERROR` if the verifier fails; the failure is reported to the
    ///   security monitor and its text is not returned
    pub async fn authenticate(
        &self,
        sources: &KeySources<'_>,
        request: &RequestInfo,
        options: &ApiKeyAuthOptions,
    ) -> Result<AuthDecision, MiddlewareError> {
        let Some(raw_key) = extract_api_key(sources, self.environment) else {
            if !options.required {
                debug!(path = %request.path, "no api key, continuing anonymously");
                return Ok(AuthDecision::Anonymous);
            }
            if options.allow_user_auth && has_jwt_bearer(sources) {
                debug!(path = %request.path, "no api key, deferring to user authentication");
                return Ok(AuthDecision::DeferredToUserAuth);
            }
            return Err(MiddlewareError::api_key_required());
        };

        let context = request.verification_context();
        match self.verifier.validate_api_key(&raw_key, &context).await {
            Ok(Verification::Granted(credential)) => {
                debug!(
                    key_id = %credential.key_id,
                    endpoint = %context.endpoint,
                    "api key accepted"
                );
                Ok(AuthDecision::Authenticated(AuthorizationContext::from_api_key(credential)))
            }
            Ok(Verification::Rejected) => {
                warn!(ip = %context.ip, endpoint = %context.endpoint, "invalid api key");
                Err(MiddlewareError::invalid_api_key())
            }
            Ok(Verification::RateLimited(window)) => {
                warn!(ip = %context.ip, %window, "api key rate limited");
                Err(MiddlewareError::rate_limited(window))
            }
            Err(e) => {
                error!(error = %e, endpoint = %context.endpoint, "api key verification failed");
                let event = SecurityEvent::new("api_key_auth_error", Severity::High).with_details(
                    serde_json::json!({
                        "error": e.to_string(),
                        "ip": context.ip,
                        "endpoint": context.endpoint,
                    }),
                );
                monitor::report(self.monitor.as_ref(), event).await;
                Err(MiddlewareError::authentication_error())
            }
        }
    }
}
