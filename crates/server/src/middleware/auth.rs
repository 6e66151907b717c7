use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shelfgate_core::{
    auth::{AuthorizationContext, RateLimitPolicy},
    middleware::{
        auth::{check_key_grants, client_ip},
        require_permissions, require_scopes, ApiKeyAuth, ApiKeyAuthOptions, AuthDecision,
        KeySources, RequestInfo,
    },
};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

pub static X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
pub static X_RATE_LIMIT_LIMIT_HOUR: HeaderName =
    HeaderName::from_static("x-ratelimit-limit-hour");
pub static X_RATE_LIMIT_LIMIT_DAY: HeaderName = HeaderName::from_static("x-ratelimit-limit-day");

/// Client address resolved by a trusted proxy layer, if one runs in front of auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedClientIp(pub IpAddr);

/// State for [`api_key_middleware`]: the shared authenticator plus this route's options.
#[derive(Clone)]
pub struct ApiKeyAuthState {
    pub auth: Arc<ApiKeyAuth>,
    pub options: Arc<ApiKeyAuthOptions>,
}

impl ApiKeyAuthState {
    pub fn new(auth: Arc<ApiKeyAuth>, options: ApiKeyAuthOptions) -> Self {
        Self { auth, options: Arc::new(options) }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_info(request: &Request<Body>) -> RequestInfo {
    let resolved = request.extensions().get::<ResolvedClientIp>().map(|ip| ip.0);
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);

    RequestInfo {
        ip: client_ip(resolved, peer),
        user_agent: header_str(request.headers(), header::USER_AGENT).map(str::to_string),
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, policy: RateLimitPolicy) {
    headers.insert(X_RATE_LIMIT_LIMIT_HOUR.clone(), HeaderValue::from(policy.requests_per_hour));
    headers.insert(X_RATE_LIMIT_LIMIT_DAY.clone(), HeaderValue::from(policy.requests_per_day));
}

/// Axum middleware that authenticates the request's API key.
///
/// The key is read from a non-JWT `Authorization: Bearer` token, the `X-API-Key` header, or
/// (in development only) the `api_key` query parameter. On success an
/// [`AuthorizationContext`] is inserted into request extensions and the key's hourly and
/// daily limits are echoed in `X-RateLimit-Limit-Hour` / `X-RateLimit-Limit-Day`, including
/// on a 403 for missing permissions or scopes.
///
/// # Errors
///
/// Returns the envelope for `API_KEY_REQUIRED`, `INVALID_API_KEY`, `RATE_LIMIT_EXCEEDED`
/// or `AUTHENTICATION_ERROR`.
pub async fn api_key_middleware(
    State(state): State<ApiKeyAuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let info = request_info(&request);
    let authorization = header_str(request.headers(), header::AUTHORIZATION).map(str::to_owned);
    let api_key_header = header_str(request.headers(), &X_API_KEY).map(str::to_owned);
    let query = request.uri().query().map(str::to_owned);

    let sources = KeySources {
        authorization: authorization.as_deref(),
        api_key_header: api_key_header.as_deref(),
        query: query.as_deref(),
    };
    let decision = state.auth.authenticate(&sources, &info, &state.options).await?;

    let context = match decision {
        AuthDecision::Anonymous | AuthDecision::DeferredToUserAuth => {
            return Ok(next.run(request).await);
        }
        AuthDecision::Authenticated(context) => context,
    };

    let Some(credential) = context.api_key.as_ref() else {
        return Ok(next.run(request).await);
    };
    let policy = credential.rate_limit;

    let mut response = match check_key_grants(credential, &state.options) {
        Ok(()) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => ApiError(err).into_response(),
    };

    set_rate_limit_headers(response.headers_mut(), policy);
    Ok(response)
}

/// Axum middleware requiring every permission in its state.
///
/// # Errors
///
/// `INSUFFICIENT_PERMISSIONS` or `AUTHENTICATION_REQUIRED`.
pub async fn require_permissions_middleware(
    State(required): State<Arc<[String]>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require_permissions(request.extensions().get::<AuthorizationContext>(), &required)?;
    Ok(next.run(request).await)
}

/// Axum middleware requiring every scope in its state on the request's API key.
///
/// # Errors
///
/// `API_KEY_REQUIRED` or `INSUFFICIENT_SCOPES`.
pub async fn require_scopes_middleware(
    State(required): State<Arc<[String]>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require_scopes(request.extensions().get::<AuthorizationContext>(), &required)?;
    Ok(next.run(request).await)
}
