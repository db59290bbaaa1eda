//! Typed per-request context.
//!
//! Middleware fills the fields it owns; handlers read them through the
//! [`RequestContext`] and [`CurrentSession`] extractors.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;

use crate::http::error::ApiError;
use crate::security::rate_limit::RateLimitDecision;
use crate::security::session::SessionRecord;

/// The limiter's verdict for this request and the key it was counted under.
#[derive(Debug, Clone)]
pub struct RateLimitOutcome {
    pub client_key: String,
    pub decision: RateLimitDecision,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Set by the session middleware once the cookie resolves to a live session.
    pub session: Option<SessionRecord>,
    /// Replacement CSRF token minted for this request.
    pub csrf_token: Option<String>,
    pub rate_limit: Option<RateLimitOutcome>,
}

impl RequestContext {
    /// The request's context, inserting an empty one if none is attached yet.
    pub fn attach(request: &mut Request<Body>) -> &mut RequestContext {
        let extensions = request.extensions_mut();
        if extensions.get::<RequestContext>().is_none() {
            extensions.insert(RequestContext::default());
        }
        match extensions.get_mut::<RequestContext>() {
            Some(ctx) => ctx,
            None => unreachable!("context inserted above"),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// The live session for this request; rejects with 401 when there is none.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionRecord);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.session.clone())
            .map(CurrentSession)
            .ok_or(ApiError::SessionInvalid)
    }
}
