//! JSON request bodies with API-shaped rejections.

use axum::extract::FromRequest;

use crate::http::error::ApiError;

/// `axum::Json`, but a malformed body is answered with the usual
/// `{ "success": false, "error": .. }` envelope instead of plain text.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
