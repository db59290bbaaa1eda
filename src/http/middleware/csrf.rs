//! CSRF guard for state-changing requests.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::context::RequestContext;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::csrf::{CSRF_BODY_FIELD, X_CSRF_TOKEN, X_NEW_CSRF_TOKEN};

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn is_json(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn token_from_header(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(X_CSRF_TOKEN)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn token_from_body(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value
        .get(CSRF_BODY_FIELD)?
        .as_str()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Require and rotate the session's CSRF token.
///
/// Must run after [`super::require_session`]. Safe methods pass through. The
/// token is read from `X-CSRF-Token`, or from the JSON body's `csrfToken`
/// field when the header is absent. On success the rotated token is sent
/// back in `X-New-CSRF-Token`.
pub async fn require_csrf(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let Some(session_id) = RequestContext::attach(&mut request)
        .session
        .as_ref()
        .map(|s| s.session_id.clone())
    else {
        return ApiError::SessionInvalid.into_response();
    };

    let mut provided = token_from_header(&request);
    if provided.is_none() && is_json(&request) {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, state.config.security.max_body_size).await {
            Ok(bytes) => bytes,
            Err(_) => return ApiError::Validation("Request body too large".into()).into_response(),
        };
        provided = token_from_body(&bytes);
        request = Request::from_parts(parts, Body::from(bytes));
    }

    let Some(provided) = provided else {
        tracing::warn!(path = %request.uri().path(), "CSRF token missing");
        metrics::record_csrf_rejection("missing");
        return ApiError::CsrfMissing.into_response();
    };

    let Some(rotated) = state.registries.csrf.validate_and_rotate(&session_id, &provided) else {
        tracing::warn!(path = %request.uri().path(), "CSRF token rejected");
        metrics::record_csrf_rejection("invalid");
        return ApiError::CsrfInvalid.into_response();
    };

    RequestContext::attach(&mut request).csrf_token = Some(rotated.clone());
    let mut response = next.run(request).await;

    // Logout drops the token along with the session; don't hand out a dead one.
    if state.registries.csrf.validate(&session_id, &rotated) {
        if let Ok(value) = HeaderValue::from_str(&rotated) {
            response.headers_mut().insert(X_NEW_CSRF_TOKEN, value);
        }
    }
    response
}
