//! Security response headers.
//!
//! Added to every response when `security.enable_headers` is on. HSTS is
//! only sent in production, where the listener is expected to be behind TLS.

use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::Environment;

fn add_common_headers(response: &mut Response) {
    let headers = response.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
}

pub async fn security_headers(
    State(environment): State<Environment>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    add_common_headers(&mut response);
    if environment == Environment::Production {
        response.headers_mut().insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    response
}
