//! Session cookie construction.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration;

use crate::config::GuardConfig;

/// `HttpOnly; SameSite=Strict; Path=/`, `Secure` in production, max-age equal
/// to the session expiry.
pub fn session_cookie(config: &GuardConfig, session_id: &str) -> Cookie<'static> {
    Cookie::build((config.session.cookie_name.clone(), session_id.to_string()))
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(config.session.expiry_secs as i64))
        .build()
}

/// An expired cookie with the same attributes, to make the browser drop it.
pub fn clear_session_cookie(config: &GuardConfig) -> Cookie<'static> {
    Cookie::build((config.session.cookie_name.clone(), String::new()))
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// The session id presented by the client, if any.
pub fn session_id_from(jar: &CookieJar, config: &GuardConfig) -> Option<String> {
    jar.get(&config.session.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
