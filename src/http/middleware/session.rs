//! Session guard.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::http::context::RequestContext;
use crate::http::cookie::{clear_session_cookie, session_id_from};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Resolve the session cookie into a live session or reject with 401.
///
/// The lookup refreshes the session's activity time. A rejected request has
/// its cookie cleared.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = session_id_from(&jar, &state.config).and_then(|id| state.registries.sessions.get(&id));

    match session {
        Some(session) => {
            RequestContext::attach(&mut request).session = Some(session);
            next.run(request).await
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "Rejected request without a valid session");
            let jar = jar.add(clear_session_cookie(&state.config));
            (jar, ApiError::SessionInvalid).into_response()
        }
    }
}
