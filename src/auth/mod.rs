//! Authentication routes.
//!
//! ```text
//! POST  /api/auth/register    registration limiter
//! POST  /api/auth/login       login limiter
//! GET   /api/auth/csrf-token  session
//! GET   /api/auth/me          session
//! PATCH /api/auth/me          session + CSRF
//! POST  /api/auth/logout      session + CSRF
//! ```

pub mod dto;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::handlers::*;
use crate::http::middleware::{require_csrf, require_session};
use crate::http::server::AppState;
use crate::security::rate_limit::rate_limit_middleware;

pub fn setup_auth_router(state: AppState) -> Router {
    let limited = Router::new()
        .route(
            "/api/auth/register",
            post(register).route_layer(middleware::from_fn_with_state(
                state.registries.register_limiter.clone(),
                rate_limit_middleware,
            )),
        )
        .route(
            "/api/auth/login",
            post(login).route_layer(middleware::from_fn_with_state(
                state.registries.login_limiter.clone(),
                rate_limit_middleware,
            )),
        );

    // Layers run bottom-up: the session guard wraps the CSRF guard.
    let protected = Router::new()
        .route("/api/auth/csrf-token", get(csrf_token))
        .route("/api/auth/me", get(me).patch(update_me))
        .route("/api/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_csrf))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    limited.merge(protected).with_state(state)
}
