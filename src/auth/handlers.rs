use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::dto::*;
use crate::http::context::{CurrentSession, RequestContext};
use crate::http::cookie::{clear_session_cookie, session_cookie, session_id_from};
use crate::http::error::ApiError;
use crate::http::json::ApiJson;
use crate::http::server::AppState;
use crate::security::rate_limit::{client_key, RateLimiter};
use crate::security::session::NewSession;
use crate::users::{
    hash_password, is_valid_email, normalize_email, verify_password, UserProfile,
    MAX_DISPLAY_NAME_LEN, MIN_PASSWORD_LEN,
};

/// Clear the limiter entry the middleware counted this request under.
fn report_success(limiter: &RateLimiter, ctx: &RequestContext) {
    if let Some(outcome) = &ctx.rate_limit {
        limiter.record_success(&outcome.client_key);
    }
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn validate_display_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Display name must be 1-{MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let email = normalize_email(&body.email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let display_name = match body.display_name.as_deref() {
        Some(name) => validate_display_name(name)?.to_string(),
        None => email.split('@').next().unwrap_or_default().to_string(),
    };

    if state.users.find_by_email(&email).is_some() {
        tracing::warn!(email = %email, "Registration for existing email");
        return Err(ApiError::Conflict("Email is already registered".into()));
    }

    let password = body.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let user = state.users.insert(&email, &display_name, hash)?;

    report_success(&state.registries.register_limiter, &ctx);
    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            user: UserProfile::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let Some(user) = state.users.find_by_email(&body.email) else {
        tracing::warn!("Failed login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let password = body.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&hash, &password)).await??;
    if !valid {
        tracing::warn!(user_id = user.id, "Failed login attempt: invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    report_success(&state.registries.login_limiter, &ctx);

    // Never promote a pre-login session id: mint a fresh one.
    let old_session = session_id_from(&jar, &state.config);
    if let Some(old) = &old_session {
        state.registries.csrf.remove(old);
    }
    let session_id = state.registries.sessions.regenerate(
        old_session.as_deref(),
        NewSession {
            user_id: user.id,
            user_uuid: user.uuid,
            email: user.email.clone(),
            ip_address: client_key(&headers),
            user_agent: user_agent(&headers),
        },
    );

    tracing::info!(user_id = user.id, "Login succeeded");

    let jar = jar.add(session_cookie(&state.config, &session_id));
    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            user: UserProfile::from(&user),
            expires_in: state.config.session.expiry_secs,
        }),
    ))
}

pub async fn csrf_token(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<CsrfTokenResponse> {
    let csrf_token = state.registries.csrf.issue(&session.session_id);
    Json(CsrfTokenResponse {
        success: true,
        csrf_token,
    })
}

pub async fn me(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: CookieJar,
) -> Result<Json<UserResponse>, (CookieJar, ApiError)> {
    let Some(user) = state.users.find_by_id(session.user_id) else {
        // The account is gone; the session must not outlive it.
        state.registries.sessions.destroy(&session.session_id);
        state.registries.csrf.remove(&session.session_id);
        tracing::warn!(user_id = session.user_id, "Session for missing user destroyed");
        return Err((jar.add(clear_session_cookie(&state.config)), ApiError::SessionInvalid));
    };
    Ok(Json(UserResponse {
        success: true,
        user: UserProfile::from(&user),
    }))
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let name = validate_display_name(&body.display_name)?;
    let user = state.users.update_display_name(session.user_id, name)?;
    tracing::info!(user_id = user.id, "Profile updated");
    Ok(Json(UserResponse {
        success: true,
        user: UserProfile::from(&user),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: CookieJar,
) -> (CookieJar, Json<AckResponse>) {
    state.registries.sessions.destroy(&session.session_id);
    state.registries.csrf.remove(&session.session_id);
    tracing::info!(user_id = session.user_id, "Logged out");

    (
        jar.add(clear_session_cookie(&state.config)),
        Json(AckResponse {
            success: true,
            message: "Logged out",
        }),
    )
}
